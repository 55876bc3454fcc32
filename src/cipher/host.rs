//! Hostname obfuscation for the VPN gateway.
//!
//! The reverse proxy will not route a request unless the target host is
//! encrypted into the URL path: `{base}/{scheme}[-{port}]/{hex}{path}`. The
//! hex segment is the fixed 16-byte key (doubling as the IV, so it travels
//! in the clear by construction) followed by the AES-128-CFB ciphertext of
//! the host name. The format is fixed by the gateway; any deviation breaks
//! every downstream request.

use url::Url;

use super::aes::{BLOCK_SIZE, cfb_decrypt, cfb_encrypt};
use super::{CipherError, hex_decode, hex_encode};

/// Fixed hostname-cipher key, reused as the IV.
const HOST_KEY: &[u8; BLOCK_SIZE] = b"wrdvpnisthebest!";

/// Lowercase hex of the fixed key - the constant prefix of every
/// [`encrypt_host`] output.
pub const HOST_KEY_HEX: &str = "77726476706e69737468656265737421";

/// Encrypts a host name into the gateway's hex path segment.
///
/// Deterministic: the same host always yields the same output. Total over
/// any UTF-8 host string.
#[must_use]
pub fn encrypt_host(host: &str) -> String {
    let ciphertext = cfb_encrypt(HOST_KEY, HOST_KEY, host.as_bytes());
    let mut out = String::with_capacity((BLOCK_SIZE + ciphertext.len()) * 2);
    out.push_str(HOST_KEY_HEX);
    out.push_str(&hex_encode(&ciphertext));
    out
}

/// Inverse of [`encrypt_host`], for diagnostics and tests.
///
/// The embedded IV prefix is honored as transmitted.
///
/// # Errors
///
/// Returns [`CipherError::InvalidEncoding`] when the input is not hex, is
/// shorter than the IV prefix, or decrypts to non-UTF-8 bytes.
pub fn decrypt_host(encrypted: &str) -> Result<String, CipherError> {
    let bytes = hex_decode(encrypted)?;
    if bytes.len() < BLOCK_SIZE {
        return Err(CipherError::invalid_encoding("missing IV prefix"));
    }

    let mut iv = [0_u8; BLOCK_SIZE];
    iv.copy_from_slice(&bytes[..BLOCK_SIZE]);
    let plaintext = cfb_decrypt(HOST_KEY, &iv, &bytes[BLOCK_SIZE..]);

    String::from_utf8(plaintext)
        .map_err(|_| CipherError::invalid_encoding("decrypted host is not UTF-8"))
}

/// Rewrites an absolute URL into its VPN-proxied form:
/// `{proxy_base}/{scheme}[-{port}]/{encrypt_host(host)}{path[?query]}`.
///
/// The port is appended to the scheme segment only when the URL carries an
/// explicit non-default port.
///
/// # Errors
///
/// Returns [`CipherError::InvalidUrl`] for unparseable input and
/// [`CipherError::UnsupportedScheme`] for anything but http/https.
pub fn to_proxy_url(proxy_base: &str, original: &str) -> Result<String, CipherError> {
    let url = Url::parse(original).map_err(|_| CipherError::invalid_url(original))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(CipherError::unsupported_scheme(scheme));
    }

    let host = url
        .host_str()
        .ok_or_else(|| CipherError::invalid_url(original))?;

    let scheme_segment = match url.port() {
        Some(port) => format!("{scheme}-{port}"),
        None => scheme.to_string(),
    };

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    Ok(format!(
        "{}/{}/{}{}",
        proxy_base.trim_end_matches('/'),
        scheme_segment,
        encrypt_host(host),
        path
    ))
}
