//! `reqwest`-backed [`Transport`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};

use super::{Method, Transport, TransportError, TransportRequest, TransportResponse};

/// Default HTTP connect timeout (10 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default HTTP read timeout (30 seconds; portal pages are small).
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Redirect cap for requests that opt into transport-level following.
const TRANSPORT_REDIRECT_CAP: usize = 10;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("campus-session/{version}")
}

/// HTTP transport for portal traffic.
///
/// Redirects are not followed by default: the login state machine inspects
/// every `Location` itself, attaching the right cookie jar per hop. A second
/// pooled client handles the few requests that opt into transport-level
/// following. Cookie handling is fully manual (the jars own it), so the
/// clients are built without a cookie store.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    manual: Client,
    following: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let manual = build_client(Policy::none(), connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        let following = build_client(
            Policy::limited(TRANSPORT_REDIRECT_CAP),
            connect_timeout_secs,
            read_timeout_secs,
        )
        .expect("failed to build HTTP client with static configuration");
        Self { manual, following }
    }
}

fn build_client(
    redirect_policy: Policy,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .user_agent(default_user_agent())
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .redirect(redirect_policy)
        .gzip(true)
        .build()
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self, request), fields(method = ?request.method, url = %request.url))]
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.url.clone();
        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.manual
        };

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::invalid_url(&url))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| TransportError::invalid_url(&url))?;
            headers.append(name, value);
        }
        if let Some(cookies) = &request.cookies {
            let value =
                HeaderValue::from_str(cookies).map_err(|_| TransportError::invalid_url(&url))?;
            headers.insert(COOKIE, value);
        }
        if request.body.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        }

        let mut builder = client.request(method, &url).headers(headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                TransportError::timeout(&url)
            } else if error.is_builder() {
                TransportError::invalid_url(&url)
            } else {
                TransportError::network(&url, error)
            }
        })?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let set_cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let body = response
            .text()
            .await
            .map_err(|error| TransportError::network(&url, error))?;

        debug!(status, cookies = set_cookies.len(), "response received");
        Ok(TransportResponse {
            status,
            location,
            set_cookies,
            body,
        })
    }
}
