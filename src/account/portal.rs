//! Teaching-affairs portal account.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::cipher::encode_credentials;
use crate::config::SessionConfig;
use crate::cookie::CookieJar;
use crate::store::{KeyValueStore, keys};
use crate::transport::{Transport, TransportRequest, TransportResponse};

use super::{
    Account, AuthError, Credentials, form_encode, is_login_redirect, load_stored_credentials,
    persist_credentials,
};

/// Portal login page, also the form submission target.
const LOGIN_PATH: &str = "/eas/login";

/// Authenticated landing page used for the verification probe.
const HOME_PATH: &str = "/eas/home";

/// Marker present in the login page body; its absence from a probed page is
/// the success signal.
const LOGIN_FORM_MARKER: &str = "id=\"loginForm\"";

/// Marker the portal renders when the account or password is rejected.
const REJECTED_MARKER: &str = "account or password incorrect";

/// The teaching-affairs system: a single host, cookie-based login, no proxy.
pub struct PortalAccount {
    scheme: String,
    host: String,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    jar: CookieJar,
    is_login: bool,
}

impl std::fmt::Debug for PortalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalAccount")
            .field("host", &self.host)
            .field("is_login", &self.is_login)
            .field("jar", &self.jar)
            .finish_non_exhaustive()
    }
}

impl PortalAccount {
    /// Creates the account for the configured portal host, loading any
    /// persisted cookies for the scope.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
    ) -> Self {
        let jar = CookieJar::load(store.clone(), keys::PORTAL_COOKIE, config.portal_host.clone());
        Self {
            scheme: config.portal_scheme.clone(),
            host: config.portal_host.clone(),
            store,
            transport,
            jar,
            is_login: false,
        }
    }

    /// The portal host this account talks to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}://{}{}", self.scheme, self.host, path)
        }
    }

    async fn send(&mut self, request: TransportRequest) -> Result<TransportResponse, AuthError> {
        let request = request.with_cookies(self.jar.cookie_string());
        let response = self.transport.perform(request).await?;
        self.jar.save_from_response(&response.set_cookies);
        Ok(response)
    }

    /// Unauthenticated GET, used during the login handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] on network failure.
    pub async fn raw_get(&mut self, path: &str) -> Result<TransportResponse, AuthError> {
        let url = self.url(path);
        self.send(TransportRequest::get(url)).await
    }

    /// Unauthenticated form POST, used during the login handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] on network failure.
    pub async fn raw_post(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, AuthError> {
        let url = self.url(path);
        self.send(TransportRequest::post(url, form_encode(form))).await
    }

    /// The portal login flow: fetch the login page for its session cookies,
    /// submit the legacy-encoded payload, then probe the home page.
    async fn perform_login(&mut self, credentials: &Credentials) -> Result<bool, AuthError> {
        let page = self.raw_get(LOGIN_PATH).await?;
        if !page.is_success() && !page.is_redirect() {
            return Err(AuthError::LoginPageUnavailable {
                status: page.status,
            });
        }

        let encoded = encode_credentials(&credentials.username, credentials.password(), "");
        let submit = self
            .raw_post(
                LOGIN_PATH,
                &[
                    ("account", credentials.username.as_str()),
                    ("encoded", encoded.as_str()),
                ],
            )
            .await?;
        if submit.body.contains(REJECTED_MARKER) {
            return Err(AuthError::WrongCredentials);
        }

        // The probe is the authoritative success signal.
        self.perform_login_check().await
    }

    /// Cheap remote session check: the home page renders without the login
    /// form iff the session cookies are live.
    async fn perform_login_check(&mut self) -> Result<bool, AuthError> {
        let probe = self.raw_get(HOME_PATH).await?;
        Ok(probe.is_success()
            && !probe.body.contains(LOGIN_FORM_MARKER)
            && !is_login_redirect(&probe))
    }

    async fn authenticated_request(
        &mut self,
        path: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Result<TransportResponse, AuthError> {
        self.ensure_logged_in().await?;

        let response = match form {
            Some(form) => self.raw_post(path, form).await?,
            None => self.raw_get(path).await?,
        };
        if !is_login_redirect(&response) {
            return Ok(response);
        }

        // Session lapsed under us: re-login once and retry exactly once.
        info!(host = %self.host, "session lapsed; re-logging in");
        self.is_login = false;
        if !self.login(None, false).await? {
            return Err(AuthError::NeedsLogin);
        }

        let retry = match form {
            Some(form) => self.raw_post(path, form).await?,
            None => self.raw_get(path).await?,
        };
        if is_login_redirect(&retry) {
            return Err(AuthError::NeedsLogin);
        }
        Ok(retry)
    }
}

#[async_trait]
impl Account for PortalAccount {
    fn is_logged_in(&self) -> bool {
        self.is_login
    }

    #[instrument(level = "debug", skip_all, fields(host = %self.host))]
    async fn login(
        &mut self,
        credentials: Option<Credentials>,
        remember: bool,
    ) -> Result<bool, AuthError> {
        let Some(credentials) = credentials.or_else(|| {
            load_stored_credentials(
                self.store.as_ref(),
                keys::PORTAL_ACCOUNT,
                keys::PORTAL_PASSWORD,
            )
        }) else {
            debug!("no credentials available; failing closed");
            return Ok(false);
        };

        match self.perform_login(&credentials).await {
            Ok(true) => {
                if remember {
                    persist_credentials(
                        self.store.as_ref(),
                        keys::PORTAL_ACCOUNT,
                        keys::PORTAL_PASSWORD,
                        &credentials,
                    );
                }
                self.is_login = true;
                info!(host = %self.host, "portal login verified");
                Ok(true)
            }
            Ok(false) => {
                self.is_login = false;
                Ok(false)
            }
            Err(error) => {
                warn!(%error, "portal login failed");
                self.is_login = false;
                Ok(false)
            }
        }
    }

    async fn ensure_logged_in(&mut self) -> Result<bool, AuthError> {
        match self.perform_login_check().await {
            Ok(true) => {
                self.is_login = true;
                return Ok(true);
            }
            Ok(false) => {}
            Err(error) => debug!(%error, "login check failed; attempting login"),
        }

        if self.login(None, false).await? {
            Ok(true)
        } else {
            Err(AuthError::NeedsLogin)
        }
    }

    async fn authenticated_get(&mut self, path: &str) -> Result<TransportResponse, AuthError> {
        self.authenticated_request(path, None).await
    }

    async fn authenticated_post(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, AuthError> {
        self.authenticated_request(path, Some(form)).await
    }

    fn logout(&mut self) {
        self.jar.clear();
        self.is_login = false;
        debug!(host = %self.host, "portal session cleared");
    }
}
