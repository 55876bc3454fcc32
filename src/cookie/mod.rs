//! Set-Cookie parsing and per-scope cookie jars.
//!
//! Portal sessions live entirely in cookies, so the jar is the unit of
//! session state: parsed from `Set-Cookie` response headers, merged keyed by
//! `(name, domain, path)`, purged of expired entries, and persisted through
//! the key-value store as a JSON array of stringified cookies.

mod jar;

pub use jar::CookieJar;

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A single parsed cookie.
///
/// The value field is intentionally redacted in Debug output to prevent
/// accidental logging of session secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// The domain the cookie belongs to.
    pub domain: String,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Absolute expiry; `None` for session cookies.
    pub expires: Option<SystemTime>,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Whether the cookie is hidden from script access.
    pub http_only: bool,
    /// Cookie value (sensitive - never log).
    value: String,
}

impl Cookie {
    /// Creates a session cookie with defaults for every attribute.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive - avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the cookie's expiry is at or before `now`.
    ///
    /// Session cookies (no expiry) never expire.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    /// The identity triple under which a jar deduplicates cookies.
    #[must_use]
    pub(crate) fn identity(&self) -> (&str, &str, &str) {
        (&self.name, &self.domain, &self.path)
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cookie")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a cookie string.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// The first segment of the cookie string is not `name=value`.
    #[error("malformed cookie: {reason} (got: {fragment})")]
    Malformed {
        /// Description of what was wrong.
        reason: String,
        /// The offending fragment (attribute text only, values excluded).
        fragment: String,
    },
}

impl CookieError {
    fn malformed(reason: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
            fragment: fragment.into(),
        }
    }
}

/// Parses a `Set-Cookie` style string into a [`Cookie`].
///
/// The first `;`-separated segment must be `name=value`; the remaining
/// segments are attributes (`Domain`, `Path`, `Expires` as HTTP-date,
/// `Max-Age` as seconds, `Secure`, `HttpOnly`). Unrecognized attributes and
/// attribute values that fail to parse are ignored; per-cookie parse
/// failures never abort a batch (callers drop the cookie and continue).
///
/// `default_domain` is applied when no `Domain` attribute is present.
///
/// # Errors
///
/// Returns [`CookieError::Malformed`] when the name/value segment is missing
/// or the name is empty.
pub fn parse_cookie(input: &str, default_domain: &str) -> Result<Cookie, CookieError> {
    let mut segments = input.split(';');

    let first = segments.next().unwrap_or_default().trim();
    let Some((name, value)) = first.split_once('=') else {
        return Err(CookieError::malformed(
            "first segment must be name=value",
            first.to_string(),
        ));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(CookieError::malformed(
            "cookie name is empty",
            first.chars().take(32).collect::<String>(),
        ));
    }

    let mut cookie = Cookie::new(name, value.trim(), default_domain);
    // Max-Age takes precedence over Expires when both are present.
    let mut saw_max_age = false;

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (attr, attr_value) = match segment.split_once('=') {
            Some((attr, attr_value)) => (attr.trim(), Some(attr_value.trim())),
            None => (segment, None),
        };

        match attr.to_ascii_lowercase().as_str() {
            "domain" => {
                if let Some(domain) = attr_value.filter(|v| !v.is_empty()) {
                    cookie.domain = domain.to_string();
                }
            }
            "path" => {
                if let Some(path) = attr_value.filter(|v| !v.is_empty()) {
                    cookie.path = path.to_string();
                }
            }
            "expires" => {
                if saw_max_age {
                    continue;
                }
                match attr_value.map(httpdate::parse_http_date) {
                    Some(Ok(expires)) => cookie.expires = Some(expires),
                    _ => {
                        tracing::debug!(name, "ignoring unparseable Expires attribute");
                    }
                }
            }
            "max-age" => match attr_value.map(str::parse::<i64>) {
                Some(Ok(seconds)) => {
                    saw_max_age = true;
                    cookie.expires = Some(max_age_to_expiry(seconds, SystemTime::now()));
                }
                _ => {
                    tracing::debug!(name, "ignoring unparseable Max-Age attribute");
                }
            },
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    Ok(cookie)
}

/// Converts a `Max-Age` value into an absolute expiry.
///
/// Non-positive values mean "expire immediately" (RFC 6265 §5.2.2).
fn max_age_to_expiry(seconds: i64, now: SystemTime) -> SystemTime {
    if seconds <= 0 {
        return UNIX_EPOCH;
    }
    now.checked_add(Duration::from_secs(seconds.unsigned_abs()))
        .unwrap_or(now)
}

/// Serializes a [`Cookie`] to the persisted wire format:
/// `"name=value; Domain=d; Path=p; Expires=<RFC1123>; Secure; HttpOnly"`.
///
/// Round-trips losslessly through [`parse_cookie`] for every attribute this
/// core sets (expiry at second precision).
#[must_use]
pub fn stringify_cookie(cookie: &Cookie) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    parts.push(format!("Domain={}", cookie.domain));
    parts.push(format!("Path={}", cookie.path));

    if let Some(expires) = cookie.expires {
        parts.push(format!("Expires={}", httpdate::fmt_http_date(expires)));
    }
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.http_only {
        parts.push("HttpOnly".to_string());
    }

    parts.join("; ")
}
