//! Authenticated remote resources.
//!
//! An [`Account`] wraps one portal: it owns the portal's cookie jar(s),
//! knows how to log in, and issues authenticated requests that transparently
//! re-login once when the session has lapsed. Two variants exist:
//!
//! - [`PortalAccount`] - the teaching-affairs system: single host,
//!   cookie-based login, no proxy.
//! - [`SsoAccount`] - the campus pass: CAS-style ticket login, dual cookie
//!   jars, and VPN gateway support with one-shot direct-to-VPN fallback.
//!
//! Accounts are constructed explicitly with their store and transport
//! collaborators injected; there are no process-wide instances. Mutual
//! exclusion per account is static: every session-mutating operation takes
//! `&mut self`, so overlapping logical operations on one account cannot be
//! expressed.

mod error;
mod portal;
mod sso;

pub use error::AuthError;
pub use portal::PortalAccount;
pub use sso::SsoAccount;

use std::fmt;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::store::KeyValueStore;
use crate::transport::TransportResponse;

/// Bound on the redirect chain the VPN gateway issues after ticket
/// validation. Reaching the bound is not a failure; the verification probe
/// decides.
pub const MAX_REDIRECT_HOPS: usize = 5;

/// A login name and password.
///
/// The password is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password (sensitive - never log).
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password.
    ///
    /// Passwords are sensitive - avoid logging the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Result of following a redirect chain.
#[derive(Debug)]
pub struct RedirectOutcome {
    /// The last response received (redirect or not).
    pub final_response: TransportResponse,
    /// How many hops were followed, at most [`MAX_REDIRECT_HOPS`].
    pub hops_followed: usize,
}

/// Contract for an authenticated remote resource.
///
/// # Object Safety
///
/// Uses `async_trait` so callers can hold `Box<dyn Account>`; Rust 2024
/// native async traits are not object-safe.
#[async_trait]
pub trait Account: Send {
    /// Returns the cached logged-in flag. The cache is not a source of
    /// truth; [`ensure_logged_in`](Account::ensure_logged_in) revalidates
    /// against the remote.
    fn is_logged_in(&self) -> bool;

    /// Logs in with the given credentials, or with persisted credentials
    /// when `credentials` is `None`. Fails closed (`Ok(false)`) when no
    /// credentials are available; handshake failures also resolve to
    /// `Ok(false)` after logging. On success, persists the credentials when
    /// `remember` is set.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Cipher`] for programmer errors on URL input;
    /// handshake and transport failures are absorbed into `Ok(false)`.
    async fn login(
        &mut self,
        credentials: Option<Credentials>,
        remember: bool,
    ) -> Result<bool, AuthError>;

    /// Confirms a live session, logging in with persisted credentials when
    /// the cheap remote check fails.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NeedsLogin`] when no session can be established.
    async fn ensure_logged_in(&mut self) -> Result<bool, AuthError>;

    /// Issues an authenticated GET for `path` (absolute URLs accepted),
    /// re-logging in once and retrying exactly once when the session has
    /// lapsed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NeedsLogin`] when the retry also lands on the
    /// login page, or [`AuthError::Transport`] for network failures.
    async fn authenticated_get(&mut self, path: &str) -> Result<TransportResponse, AuthError>;

    /// Issues an authenticated form POST for `path`. Same re-login and
    /// retry discipline as [`authenticated_get`](Account::authenticated_get).
    ///
    /// # Errors
    ///
    /// Same as [`authenticated_get`](Account::authenticated_get).
    async fn authenticated_post(
        &mut self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<TransportResponse, AuthError>;

    /// Drops the session: clears the cookie jar(s) and the logged-in flag.
    /// Persisted credentials are kept.
    fn logout(&mut self);
}

/// True when a response is a redirect onto a login page - the signature of a
/// lapsed session on an authenticated request.
pub(crate) fn is_login_redirect(response: &TransportResponse) -> bool {
    response.is_redirect()
        && response
            .location
            .as_deref()
            .is_some_and(|location| location.to_ascii_lowercase().contains("login"))
}

/// Form-urlencodes key/value pairs for a POST body.
pub(crate) fn form_encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Resolves a possibly-relative `Location` header against the URL of the
/// response that carried it.
pub(crate) fn resolve_location(base: &str, location: &str) -> String {
    Url::parse(base)
        .ok()
        .and_then(|base| base.join(location).ok())
        .map_or_else(|| location.to_string(), |resolved| resolved.to_string())
}

/// Loads persisted credentials for the given store keys.
pub(crate) fn load_stored_credentials(
    store: &dyn KeyValueStore,
    account_key: &str,
    password_key: &str,
) -> Option<Credentials> {
    let username = store.get(account_key)?;
    let password = store.get(password_key)?;
    if username.is_empty() {
        return None;
    }
    Some(Credentials::new(username, password))
}

/// Persists credentials; a store failure costs a future manual login, so it
/// is logged and swallowed.
pub(crate) fn persist_credentials(
    store: &dyn KeyValueStore,
    account_key: &str,
    password_key: &str,
    credentials: &Credentials,
) {
    if let Err(error) = store.set(account_key, &credentials.username) {
        warn!(%error, key = account_key, "failed to persist account name");
        return;
    }
    if let Err(error) = store.set(password_key, credentials.password()) {
        warn!(%error, key = password_key, "failed to persist password");
    } else {
        debug!(key = account_key, "credentials persisted");
    }
}
