//! Persisted key-value store consumed by the session core.
//!
//! The core never touches the filesystem directly; it reads and writes
//! session state (credentials, cookies, host configuration) through the
//! narrow [`KeyValueStore`] trait. Two implementations are provided:
//!
//! - [`FileStore`] - encrypted-at-rest JSON map under the user config dir
//! - [`MemoryStore`] - ephemeral map for tests and one-shot sessions

mod file;

pub use file::{FileStore, StoreError, persisted_store_path};

use std::collections::HashMap;
use std::sync::Mutex;

/// Store keys used by the session core.
///
/// The credential keys hold plain strings; the cookie keys hold JSON arrays
/// of stringified cookies (see [`crate::cookie`]).
pub mod keys {
    /// Teaching-affairs portal username.
    pub const PORTAL_ACCOUNT: &str = "PORTAL_ACCOUNT";
    /// Teaching-affairs portal password.
    pub const PORTAL_PASSWORD: &str = "PORTAL_PASSWORD";
    /// Campus SSO username.
    pub const SSO_ACCOUNT: &str = "SSO_ACCOUNT";
    /// Campus SSO password.
    pub const SSO_PASSWORD: &str = "SSO_PASSWORD";
    /// Teaching-affairs portal cookie jar.
    pub const PORTAL_COOKIE: &str = "portalCookie";
    /// SSO direct-mode cookie jar.
    pub const SSO_COOKIE: &str = "ssoCookie";
    /// SSO VPN-mode cookie jar.
    pub const VPN_COOKIE: &str = "vpnCookie";
    /// Teaching-affairs portal host override.
    pub const EA_HOST: &str = "EA_HOST";
    /// Whether portal traffic should be routed through the VPN gateway.
    pub const EA_USE_VPN: &str = "EA_USE_VPN";
}

/// Narrow persisted-storage contract consumed by the session core.
///
/// Semantics are read-modify-persist per key with no optimistic-concurrency
/// check; the last writer wins.
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value for `key`, or `None` when absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key` from the store. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the removal cannot be persisted.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory [`KeyValueStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}
