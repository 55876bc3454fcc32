//! URL obfuscation and legacy credential encoding.
//!
//! Two independent bespoke schemes, both fixed by the remote endpoints and
//! reproduced bit-for-bit:
//!
//! - [`encrypt_host`]/[`to_proxy_url`] - AES-128-CFB hostname obfuscation
//!   for the reverse-proxying VPN gateway, which requires the target host to
//!   be encrypted into the request URL itself.
//! - [`encode_credentials`] - a three-round 64-bit block cipher over the
//!   login payload, matching the portal login endpoint's legacy JavaScript
//!   encoder.
//!
//! Neither scheme is a confidentiality boundary; the keys are process-wide
//! constants the gateways expect.

mod aes;
mod host;
mod legacy;

pub use host::{HOST_KEY_HEX, decrypt_host, encrypt_host, to_proxy_url};
pub use legacy::{decode_credentials, encode_credentials};

/// Errors for URL rewriting and credential encoding.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// The URL scheme is not http or https.
    #[error("not http/https: {scheme}")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
    },

    /// The URL could not be parsed at all.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The unparseable URL string.
        url: String,
    },

    /// A hex payload handed to a decode function is malformed.
    #[error("invalid encoded payload: {reason}")]
    InvalidEncoding {
        /// Description of what was wrong.
        reason: String,
    },
}

impl CipherError {
    pub(crate) fn unsupported_scheme(scheme: impl Into<String>) -> Self {
        Self::UnsupportedScheme {
            scheme: scheme.into(),
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub(crate) fn invalid_encoding(reason: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            reason: reason.into(),
        }
    }
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

pub(crate) fn hex_decode(input: &str) -> Result<Vec<u8>, CipherError> {
    if input.len() % 2 != 0 {
        return Err(CipherError::invalid_encoding("odd-length hex"));
    }

    let digits = input
        .chars()
        .map(|c| {
            c.to_digit(16)
                .ok_or_else(|| CipherError::invalid_encoding(format!("non-hex character '{c}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(digits
        .chunks(2)
        .map(|pair| u8::try_from(pair[0] << 4 | pair[1]).unwrap_or_default())
        .collect())
}
