//! Error types for account operations.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::transport::TransportError;

/// Errors that can occur while logging in or issuing authenticated requests.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No valid session exists and one could not be established with the
    /// persisted credentials; the caller should prompt for re-authentication.
    #[error("no valid session; re-authentication required")]
    NeedsLogin,

    /// The remote rejected the account or password.
    #[error("account or password rejected by the remote")]
    WrongCredentials,

    /// The login page did not contain the expected transaction token, so the
    /// handshake broke before submission.
    #[error("login transaction token not found in login page")]
    TokenNotFound,

    /// The login page itself could not be fetched.
    #[error("login page unavailable (HTTP {status})")]
    LoginPageUnavailable {
        /// The HTTP status returned for the login page.
        status: u16,
    },

    /// Network-level failure from the transport collaborator.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// URL rewriting or payload encoding failed (programmer error on input).
    #[error(transparent)]
    Cipher(#[from] CipherError),
}
