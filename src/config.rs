//! Session configuration.
//!
//! The VPN flag and the teaching-affairs host used to be ambient global
//! state; they are now carried explicitly in [`SessionConfig`], loaded from
//! and saved to the key-value store, and handed to each account at
//! construction.

use tracing::warn;

use crate::store::{KeyValueStore, StoreError, keys};

/// Default teaching-affairs portal host.
pub const DEFAULT_PORTAL_HOST: &str = "eas.campus.edu";

/// Default campus SSO host.
pub const DEFAULT_SSO_HOST: &str = "sso.campus.edu";

/// Default VPN gateway base URL.
pub const DEFAULT_PROXY_BASE: &str = "https://vpn.campus.edu";

/// Explicit, account-local session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Teaching-affairs portal scheme (`http` or `https`).
    pub portal_scheme: String,
    /// Teaching-affairs portal host.
    pub portal_host: String,
    /// Campus SSO scheme (`http` or `https`).
    pub sso_scheme: String,
    /// Campus SSO host.
    pub sso_host: String,
    /// VPN gateway base URL (scheme + host, no trailing slash required).
    pub proxy_base: String,
    /// Whether traffic is routed through the VPN gateway.
    pub use_vpn: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            portal_scheme: "https".to_string(),
            portal_host: DEFAULT_PORTAL_HOST.to_string(),
            sso_scheme: "https".to_string(),
            sso_host: DEFAULT_SSO_HOST.to_string(),
            proxy_base: DEFAULT_PROXY_BASE.to_string(),
            use_vpn: false,
        }
    }
}

impl SessionConfig {
    /// Loads the configuration, overlaying stored overrides (`EA_HOST`,
    /// `EA_USE_VPN`) on the defaults.
    #[must_use]
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut config = Self::default();

        if let Some(host) = store.get(keys::EA_HOST)
            && !host.trim().is_empty()
        {
            config.portal_host = host;
        }

        if let Some(flag) = store.get(keys::EA_USE_VPN) {
            match flag.as_str() {
                "true" => config.use_vpn = true,
                "false" => config.use_vpn = false,
                other => warn!(value = %other, "ignoring unrecognized EA_USE_VPN value"),
            }
        }

        config
    }

    /// Persists the stored-override subset of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store rejects a write.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(keys::EA_HOST, &self.portal_host)?;
        store.set(keys::EA_USE_VPN, if self.use_vpn { "true" } else { "false" })?;
        Ok(())
    }
}
