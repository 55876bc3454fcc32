//! HTTP transport collaborator consumed by the session core.
//!
//! The core never performs socket I/O itself; it shapes a
//! [`TransportRequest`], hands it to a [`Transport`] implementation, and
//! interprets the returned status, `Location`, and `Set-Cookie` values. The
//! production implementation is [`HttpTransport`] on `reqwest`; tests supply
//! scripted implementations of the trait.

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;

/// HTTP methods used by the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
}

/// A request shaped by the session core.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Additional request headers (name, value).
    pub headers: Vec<(String, String)>,
    /// `Cookie` header value, when the owning jar has cookies to send.
    pub cookies: Option<String>,
    /// Request body (form-urlencoded for login submissions).
    pub body: Option<String>,
    /// Whether the transport itself may follow redirects. The login state
    /// machine follows redirects manually and sets this to `false`.
    pub follow_redirects: bool,
}

impl TransportRequest {
    /// Creates a GET request that does not follow redirects.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            cookies: None,
            body: None,
            follow_redirects: false,
        }
    }

    /// Creates a POST request with a form-urlencoded body, not following
    /// redirects.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            cookies: None,
            body: Some(body.into()),
            follow_redirects: false,
        }
    }

    /// Attaches a `Cookie` header value; empty strings are treated as "no
    /// cookies".
    #[must_use]
    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        let cookies = cookies.into();
        self.cookies = if cookies.is_empty() {
            None
        } else {
            Some(cookies)
        };
        self
    }

    /// Appends a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Allows the transport to follow redirects itself.
    #[must_use]
    pub fn following_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }
}

/// A response as interpreted by the session core.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Location` header, when present.
    pub location: Option<String>,
    /// All `Set-Cookie` header values, in response order.
    pub set_cookies: Vec<String>,
    /// Response body decoded as text.
    pub body: String,
}

impl TransportResponse {
    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 3xx statuses carrying a `Location` header.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location.is_some()
    }
}

/// Errors surfaced by transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl TransportError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Trait the session core consumes for all HTTP traffic.
///
/// # Object Safety
///
/// Uses `async_trait` to support dynamic dispatch via `Arc<dyn Transport>`;
/// Rust 2024 native async traits are not object-safe.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one HTTP request and returns the interpreted response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] for network-level failures; HTTP error
    /// statuses are returned as responses, not errors.
    async fn perform(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}
