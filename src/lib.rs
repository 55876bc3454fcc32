//! Campus Session Core Library
//!
//! This library authenticates a user against two independently-secured
//! campus web portals - the teaching-affairs system and the unified campus
//! SSO ("pass") portal - maintains per-portal session state, and optionally
//! routes all traffic through a reverse-proxying VPN gateway that requires
//! host names to be encrypted into the request URL itself.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`cookie`] - Set-Cookie parsing, expiry, and persisted cookie jars
//! - [`cipher`] - VPN hostname obfuscation and the legacy credential encoder
//! - [`account`] - the [`Account`] contract with the portal and SSO variants
//! - [`transport`] - the HTTP collaborator trait and its `reqwest` backend
//! - [`store`] - the persisted key-value collaborator trait and its backends
//! - [`config`] - explicit session configuration (hosts, VPN flag)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod account;
pub mod cipher;
pub mod config;
pub mod cookie;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use account::{
    Account, AuthError, Credentials, MAX_REDIRECT_HOPS, PortalAccount, RedirectOutcome, SsoAccount,
};
pub use cipher::{CipherError, decode_credentials, encode_credentials, encrypt_host, to_proxy_url};
pub use config::{DEFAULT_PROXY_BASE, SessionConfig};
pub use cookie::{Cookie, CookieError, CookieJar, parse_cookie, stringify_cookie};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
pub use transport::{
    HttpTransport, Method, Transport, TransportError, TransportRequest, TransportResponse,
};
