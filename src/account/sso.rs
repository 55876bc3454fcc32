//! Campus pass (SSO) account with VPN gateway support.
//!
//! The SSO speaks CAS: fetch the login page, extract the `lt` transaction
//! token, submit the legacy-encoded payload, then ride the ticket redirect
//! chain to the authenticated landing page. In VPN mode every URL is
//! rewritten through the gateway's hostname cipher and the chain grows by a
//! few gateway-issued hops (ticket exchange, token login, landing page).
//!
//! Whatever the redirect chain does, the verification probe has the last
//! word: the account is logged in iff the landing page renders without the
//! login form.

use std::sync::Arc;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::cipher::{encode_credentials, to_proxy_url};
use crate::config::SessionConfig;
use crate::cookie::{Cookie, CookieJar};
use crate::store::{KeyValueStore, keys};
use crate::transport::{Transport, TransportRequest, TransportResponse};

use super::{
    Account, AuthError, Credentials, MAX_REDIRECT_HOPS, RedirectOutcome, form_encode,
    is_login_redirect, load_stored_credentials, persist_credentials, resolve_location,
};

/// CAS login endpoint on the SSO host.
const CAS_LOGIN_PATH: &str = "/authserver/login";

/// Authenticated landing page: the CAS service parameter and the
/// verification probe target.
const SERVICE_PATH: &str = "/personal/home";

/// Marker present in the CAS login page; its absence from a probed page is
/// the success signal.
const LOGIN_FORM_MARKER: &str = "id=\"casLoginForm\"";

/// Marker CAS renders when the account or password is rejected.
const REJECTED_MARKER: &str = "Invalid credentials";

/// Fixed execution markers the CAS form expects alongside the payload.
const CAS_EXECUTION: &str = "e1s1";
const CAS_EVENT_ID: &str = "submit";

/// Substring identifying the gateway-issued ticket cookie in the VPN jar.
const VPN_TICKET_COOKIE_MARKER: &str = "vpn_ticket";

// CAS embeds the transaction token as a hidden form field.
static LT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"name="lt"\s+value="(LT-[^"]+)""#).expect("lt regex is valid") // Static pattern, safe to panic
});

/// The campus pass: CAS ticket login, dual cookie jars, VPN fallback.
pub struct SsoAccount {
    sso_scheme: String,
    sso_host: String,
    proxy_base: String,
    use_vpn: bool,
    store: Arc<dyn KeyValueStore>,
    transport: Arc<dyn Transport>,
    direct_jar: CookieJar,
    vpn_jar: CookieJar,
    is_login: bool,
}

impl std::fmt::Debug for SsoAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsoAccount")
            .field("sso_host", &self.sso_host)
            .field("use_vpn", &self.use_vpn)
            .field("is_login", &self.is_login)
            .field("direct_jar", &self.direct_jar)
            .field("vpn_jar", &self.vpn_jar)
            .finish_non_exhaustive()
    }
}

impl SsoAccount {
    /// Creates the account for the configured SSO host, loading the
    /// persisted jars for both modes.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        config: &SessionConfig,
    ) -> Self {
        let direct_jar = CookieJar::load(store.clone(), keys::SSO_COOKIE, config.sso_host.clone());
        let vpn_host = proxy_host(&config.proxy_base);
        let vpn_jar = CookieJar::load(store.clone(), keys::VPN_COOKIE, vpn_host);

        Self {
            sso_scheme: config.sso_scheme.clone(),
            sso_host: config.sso_host.clone(),
            proxy_base: config.proxy_base.clone(),
            use_vpn: config.use_vpn,
            store,
            transport,
            direct_jar,
            vpn_jar,
            is_login: false,
        }
    }

    /// Whether requests currently route through the VPN gateway. Flips on
    /// when a direct login only succeeded through the fallback.
    #[must_use]
    pub fn uses_vpn(&self) -> bool {
        self.use_vpn
    }

    /// The gateway-issued VPN ticket cookie, when one is present.
    #[must_use]
    pub fn vpn_ticket(&self) -> Option<&Cookie> {
        self.vpn_jar
            .cookies()
            .find(|cookie| cookie.name.contains(VPN_TICKET_COOKIE_MARKER))
    }

    fn jar(&self, vpn: bool) -> &CookieJar {
        if vpn { &self.vpn_jar } else { &self.direct_jar }
    }

    fn jar_mut(&mut self, vpn: bool) -> &mut CookieJar {
        if vpn { &mut self.vpn_jar } else { &mut self.direct_jar }
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}://{}{}", self.sso_scheme, self.sso_host, path)
        }
    }

    /// Rewrites an origin-form URL for the active mode. Gateway-issued
    /// redirect locations arrive already proxied and must not pass through
    /// here again.
    fn resolve_url(&self, url: &str, vpn: bool) -> Result<String, AuthError> {
        if vpn {
            Ok(to_proxy_url(&self.proxy_base, url)?)
        } else {
            Ok(url.to_string())
        }
    }

    async fn send(
        &mut self,
        request: TransportRequest,
        vpn: bool,
    ) -> Result<TransportResponse, AuthError> {
        let request = request.with_cookies(self.jar(vpn).cookie_string());
        let response = self.transport.perform(request).await?;
        self.jar_mut(vpn).save_from_response(&response.set_cookies);
        Ok(response)
    }

    /// Unauthenticated GET in the active mode, used during the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Transport`] on network failure and
    /// [`AuthError::Cipher`] when VPN rewriting rejects the URL.
    pub async fn raw_get(&mut self, path: &str) -> Result<TransportResponse, AuthError> {
        let url = self.resolve_url(&self.absolute_url(path), self.use_vpn)?;
        let vpn = self.use_vpn;
        self.send(TransportRequest::get(url), vpn).await
    }

    /// Unauthenticated form POST in the active mode.
    ///
    /// # Errors
    ///
    /// Same as [`raw_get`](Self::raw_get).
    pub async fn raw_post(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, AuthError> {
        let url = self.resolve_url(&self.absolute_url(path), self.use_vpn)?;
        let vpn = self.use_vpn;
        self.send(TransportRequest::post(url, form_encode(form)), vpn)
            .await
    }

    /// One full pass of the login state machine in the given mode:
    /// `FetchLoginPage -> ExtractToken -> Submit -> FollowRedirects ->
    /// Verified`.
    #[instrument(level = "debug", skip(self, credentials))]
    async fn perform_login(
        &mut self,
        credentials: &Credentials,
        vpn: bool,
    ) -> Result<bool, AuthError> {
        // FetchLoginPage
        let service = self.absolute_url(SERVICE_PATH);
        let login_url = format!(
            "{}?service={}",
            self.absolute_url(CAS_LOGIN_PATH),
            urlencoding::encode(&service)
        );
        let login_url = self.resolve_url(&login_url, vpn)?;
        let page = self.send(TransportRequest::get(&login_url), vpn).await?;
        if !page.is_success() {
            return Err(AuthError::LoginPageUnavailable {
                status: page.status,
            });
        }

        // ExtractToken
        let token = extract_login_token(&page.body).ok_or(AuthError::TokenNotFound)?;
        debug!(token_len = token.len(), "transaction token extracted");

        // Submit
        let encoded = encode_credentials(&credentials.username, credentials.password(), &token);
        let ul = credentials.username.len().to_string();
        let pl = credentials.password().len().to_string();
        let form = [
            ("rsa", encoded.as_str()),
            ("ul", ul.as_str()),
            ("pl", pl.as_str()),
            ("lt", token.as_str()),
            ("execution", CAS_EXECUTION),
            ("_eventId", CAS_EVENT_ID),
        ];
        let submit = self
            .send(TransportRequest::post(&login_url, form_encode(&form)), vpn)
            .await?;
        if submit.body.contains(REJECTED_MARKER) {
            return Err(AuthError::WrongCredentials);
        }

        // FollowRedirects: the ticket redirect is the fast path; in VPN mode
        // the gateway appends its own exchange hops. Chain trouble never
        // decides the login - the probe below does.
        if submit.is_redirect()
            && let Some(location) = submit.location.clone()
            && location.contains("ticket=")
        {
            debug!(has_ticket = extract_ticket(&location).is_some(), "ticket redirect received");
            match self.follow_redirect_chain(&login_url, &location, vpn).await {
                Ok(outcome) => debug!(
                    hops = outcome.hops_followed,
                    status = outcome.final_response.status,
                    "redirect chain finished"
                ),
                Err(error) => {
                    warn!(%error, "redirect chain aborted; proceeding to verification");
                }
            }
        }

        // Verified
        self.verify_session(vpn).await
    }

    /// Follows the post-submit redirect chain, carrying the latest cookie
    /// set and the previous URL as Referer into each hop, bounded by
    /// [`MAX_REDIRECT_HOPS`].
    async fn follow_redirect_chain(
        &mut self,
        start_url: &str,
        first_location: &str,
        vpn: bool,
    ) -> Result<RedirectOutcome, AuthError> {
        let mut referer = start_url.to_string();
        let mut next = resolve_location(&referer, first_location);
        let mut hops_followed = 0;

        loop {
            let request = TransportRequest::get(&next).with_header("Referer", referer.clone());
            let response = self.send(request, vpn).await?;
            hops_followed += 1;

            if !response.is_redirect() || hops_followed >= MAX_REDIRECT_HOPS {
                return Ok(RedirectOutcome {
                    final_response: response,
                    hops_followed,
                });
            }

            referer = next;
            // is_redirect() guarantees a Location.
            let location = response.location.clone().unwrap_or_default();
            next = resolve_location(&referer, &location);
        }
    }

    /// The authoritative success signal: the landing page renders without
    /// the login form.
    async fn verify_session(&mut self, vpn: bool) -> Result<bool, AuthError> {
        let probe_url = self.resolve_url(&self.absolute_url(SERVICE_PATH), vpn)?;
        let probe = self.send(TransportRequest::get(probe_url), vpn).await?;
        Ok(probe.is_success()
            && !probe.body.contains(LOGIN_FORM_MARKER)
            && !is_login_redirect(&probe))
    }

    /// Cheap remote session check in the active mode. VPN sessions without a
    /// gateway ticket cookie cannot be live, so they skip the network trip.
    async fn perform_login_check(&mut self) -> Result<bool, AuthError> {
        if self.use_vpn && self.vpn_ticket().is_none() {
            return Ok(false);
        }
        let vpn = self.use_vpn;
        self.verify_session(vpn).await
    }
}

#[async_trait]
impl Account for SsoAccount {
    fn is_logged_in(&self) -> bool {
        self.is_login
    }

    #[instrument(level = "debug", skip_all, fields(host = %self.sso_host, vpn = self.use_vpn))]
    async fn login(
        &mut self,
        credentials: Option<Credentials>,
        remember: bool,
    ) -> Result<bool, AuthError> {
        let Some(credentials) = credentials.or_else(|| {
            load_stored_credentials(self.store.as_ref(), keys::SSO_ACCOUNT, keys::SSO_PASSWORD)
        }) else {
            debug!("no credentials available; failing closed");
            return Ok(false);
        };

        let verified = if self.use_vpn {
            self.perform_login(&credentials, true).await
        } else {
            match self.perform_login(&credentials, false).await {
                Ok(verified) => Ok(verified),
                Err(error) => {
                    // One-shot fallback: any direct-mode failure gets a
                    // single retry through the gateway. A credential
                    // rejection is logged distinctly but follows the same
                    // path.
                    if matches!(error, AuthError::WrongCredentials) {
                        info!("credentials rejected in direct mode; retrying once through the VPN gateway");
                    } else {
                        warn!(%error, "direct login failed; retrying once through the VPN gateway");
                    }
                    let fallback = self.perform_login(&credentials, true).await;
                    if matches!(fallback, Ok(true)) {
                        self.use_vpn = true;
                    }
                    fallback
                }
            }
        };

        match verified {
            Ok(true) => {
                if remember {
                    persist_credentials(
                        self.store.as_ref(),
                        keys::SSO_ACCOUNT,
                        keys::SSO_PASSWORD,
                        &credentials,
                    );
                }
                self.is_login = true;
                info!(vpn = self.use_vpn, "SSO login verified");
                Ok(true)
            }
            Ok(false) => {
                // Verification-probe failure is authoritative; no retry.
                self.is_login = false;
                Ok(false)
            }
            Err(error) => {
                warn!(%error, "SSO login failed");
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
        self.direct_jar.clear();
        self.vpn_jar.clear();
        self.is_login = false;
        debug!(host = %self.sso_host, "SSO session cleared");
    }
}

impl SsoAccount {
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
        info!(host = %self.sso_host, "session lapsed; re-logging in");
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

/// Extracts the CAS `lt` transaction token from a login page body.
pub(crate) fn extract_login_token(body: &str) -> Option<String> {
    LT_PATTERN
        .captures(body)
        .map(|captures| captures[1].to_string())
}

/// Extracts the `ticket` query parameter from a redirect location.
pub(crate) fn extract_ticket(location: &str) -> Option<String> {
    let url = url::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "ticket")
        .map(|(_, value)| value.into_owned())
}

/// The host component of the proxy base, used as the VPN jar's default
/// cookie domain.
fn proxy_host(proxy_base: &str) -> String {
    url::Url::parse(proxy_base)
        .ok()
        .and_then(|url| url.host_str().map(ToString::to_string))
        .unwrap_or_else(|| proxy_base.to_string())
}
