//! Per-scope cookie jar with persistence round-trip.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::store::KeyValueStore;

use super::{Cookie, parse_cookie, stringify_cookie};

/// Mutable, ordered cookie storage scoped to one `(domain, store key)` pair.
///
/// The jar is the unit of session state for one account/mode: it is loaded
/// from the persisted store at construction, merged on every response that
/// carries `Set-Cookie`, persisted after every mutation, and cleared on
/// logout. Within one jar, `(name, domain, path)` is unique; the most
/// recently received cookie for that triple wins.
///
/// Failure policy: malformed individual cookies never fail a batch, a
/// storage read failure yields an empty jar, and a persist failure only
/// degrades to a future re-login, so it is logged and swallowed.
pub struct CookieJar {
    store: Arc<dyn KeyValueStore>,
    store_key: String,
    default_domain: String,
    cookies: Vec<Cookie>,
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieJar")
            .field("store_key", &self.store_key)
            .field("default_domain", &self.default_domain)
            .field("cookies", &self.cookies.len())
            .finish()
    }
}

impl CookieJar {
    /// Loads the jar persisted under `store_key`, parsing each stored cookie
    /// string. Parse failures are dropped silently; a read failure yields an
    /// empty jar (fail-open for reads).
    #[must_use]
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        store_key: impl Into<String>,
        default_domain: impl Into<String>,
    ) -> Self {
        let store_key = store_key.into();
        let default_domain = default_domain.into();

        let mut cookies = Vec::new();
        if let Some(raw) = store.get(&store_key) {
            match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(lines) => {
                    for line in lines {
                        match parse_cookie(&line, &default_domain) {
                            Ok(cookie) => cookies.push(cookie),
                            Err(error) => {
                                warn!(key = %store_key, %error, "skipping persisted cookie");
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(key = %store_key, %error, "persisted cookie payload unreadable; starting empty");
                }
            }
        }

        debug!(key = %store_key, count = cookies.len(), "cookie jar loaded");
        Self {
            store,
            store_key,
            default_domain,
            cookies,
        }
    }

    /// Merges `Set-Cookie` header values into the jar, purges expired
    /// cookies, and persists the result.
    ///
    /// Each value is parsed with the jar's default domain; a cookie replaces
    /// any existing cookie with the same `(name, domain, path)` in place
    /// (preserving insertion order) or is appended. Malformed values are
    /// dropped with a warning. A persist failure is logged and swallowed.
    pub fn save_from_response(&mut self, set_cookies: &[String]) {
        if set_cookies.is_empty() {
            return;
        }

        for line in set_cookies {
            match parse_cookie(line, &self.default_domain) {
                Ok(cookie) => self.upsert(cookie),
                Err(error) => {
                    warn!(key = %self.store_key, %error, "dropping malformed response cookie");
                }
            }
        }

        let now = SystemTime::now();
        self.cookies.retain(|cookie| !cookie.is_expired(now));
        self.persist();
    }

    /// Replace-or-insert keyed by `(name, domain, path)`.
    fn upsert(&mut self, cookie: Cookie) {
        match self
            .cookies
            .iter_mut()
            .find(|existing| existing.identity() == cookie.identity())
        {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// Returns `name=value` pairs of all non-expired cookies joined with
    /// `"; "`, in insertion order - the value of a request `Cookie` header.
    #[must_use]
    pub fn cookie_string(&self) -> String {
        let now = SystemTime::now();
        self.cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value()))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Iterates over the non-expired cookies in insertion order.
    pub fn cookies(&self) -> impl Iterator<Item = &Cookie> {
        let now = SystemTime::now();
        self.cookies.iter().filter(move |c| !c.is_expired(now))
    }

    /// Returns the first non-expired cookie with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies().find(|cookie| cookie.name == name)
    }

    /// Returns true when the jar holds no non-expired cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies().next().is_none()
    }

    /// Empties the jar and deletes the persisted entry.
    pub fn clear(&mut self) {
        self.cookies.clear();
        if let Err(error) = self.store.remove(&self.store_key) {
            warn!(key = %self.store_key, %error, "failed to remove persisted cookies");
        }
    }

    fn persist(&self) {
        let now = SystemTime::now();
        let lines = self
            .cookies
            .iter()
            .filter(|cookie| !cookie.is_expired(now))
            .map(stringify_cookie)
            .collect::<Vec<_>>();

        let payload = match serde_json::to_string(&lines) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(key = %self.store_key, %error, "failed to serialize cookies");
                return;
            }
        };

        if let Err(error) = self.store.set(&self.store_key, &payload) {
            // Losing a freshly issued cookie only costs a future re-login.
            warn!(key = %self.store_key, %error, "failed to persist cookies");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use crate::store::{MemoryStore, StoreError};

    use super::*;

    fn jar_with_store() -> (Arc<MemoryStore>, CookieJar) {
        let store = Arc::new(MemoryStore::new());
        let jar = CookieJar::load(store.clone(), "testCookie", "sso.campus.edu");
        (store, jar)
    }

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_save_and_cookie_string_insertion_order() {
        let (_store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["a=1", "b=2; Path=/x"]));
        assert_eq!(jar.cookie_string(), "a=1; b=2");
    }

    #[test]
    fn test_latest_cookie_wins_for_same_identity() {
        let (_store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["sid=old"]));
        jar.save_from_response(&lines(&["other=x", "sid=new"]));

        assert_eq!(
            jar.cookie_string(),
            "sid=new; other=x",
            "replacement should keep the original insertion position"
        );
    }

    #[test]
    fn test_same_name_different_path_are_distinct() {
        let (_store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["sid=a; Path=/", "sid=b; Path=/portal"]));
        assert_eq!(jar.cookie_string(), "sid=a; sid=b");
    }

    #[test]
    fn test_expired_cookie_excluded_from_cookie_string_and_persist() {
        let (store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&[
            "live=1",
            "dead=1; Expires=Thu, 01 Jan 1970 00:00:01 GMT",
        ]));

        assert_eq!(jar.cookie_string(), "live=1");

        let persisted = store.get("testCookie").unwrap();
        assert!(persisted.contains("live=1"));
        assert!(
            !persisted.contains("dead"),
            "expired cookies must not survive a persist cycle: {persisted}"
        );
    }

    #[test]
    fn test_malformed_cookie_does_not_fail_batch() {
        let (_store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["good=1", "totally-broken", "also=2"]));
        assert_eq!(jar.cookie_string(), "good=1; also=2");
    }

    #[test]
    fn test_persistence_round_trip() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut jar = CookieJar::load(store.clone(), "testCookie", "sso.campus.edu");
            jar.save_from_response(&lines(&[
                "sid=abc; Domain=.campus.edu; Path=/; Secure; HttpOnly",
            ]));
        }

        let reloaded = CookieJar::load(store, "testCookie", "sso.campus.edu");
        assert_eq!(reloaded.cookie_string(), "sid=abc");
        let cookie = reloaded.get("sid").unwrap();
        assert_eq!(cookie.domain, ".campus.edu");
        assert!(cookie.secure);
        assert!(cookie.http_only);
    }

    #[test]
    fn test_load_with_garbage_payload_yields_empty_jar() {
        let store = Arc::new(MemoryStore::new());
        store.set("testCookie", "not json at all").unwrap();

        let jar = CookieJar::load(store, "testCookie", "sso.campus.edu");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_load_drops_individual_bad_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "testCookie",
                r#"["good=1; Domain=x; Path=/", "broken-line"]"#,
            )
            .unwrap();

        let jar = CookieJar::load(store, "testCookie", "sso.campus.edu");
        assert_eq!(jar.cookie_string(), "good=1");
    }

    #[test]
    fn test_clear_empties_jar_and_store() {
        let (store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["sid=abc"]));
        assert!(store.get("testCookie").is_some());

        jar.clear();
        assert!(jar.is_empty());
        assert_eq!(jar.cookie_string(), "");
        assert!(store.get("testCookie").is_none());
    }

    #[test]
    fn test_default_domain_applied_when_absent() {
        let (_store, mut jar) = jar_with_store();
        jar.save_from_response(&lines(&["sid=abc", "scoped=1; Domain=.campus.edu"]));
        assert_eq!(jar.get("sid").unwrap().domain, "sso.campus.edu");
        assert_eq!(jar.get("scoped").unwrap().domain, ".campus.edu");
    }

    #[test]
    fn test_get_skips_expired() {
        let (_store, mut jar) = jar_with_store();
        let mut dead = Cookie::new("sid", "v", "host");
        dead.expires = Some(UNIX_EPOCH + Duration::from_secs(1));
        jar.upsert(dead);
        assert!(jar.get("sid").is_none());
    }

    // Persist failures must degrade to a warning, never an error.
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::EncryptionFailed)
        }

        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::EncryptionFailed)
        }
    }

    #[test]
    fn test_persist_failure_is_non_fatal() {
        let mut jar = CookieJar::load(Arc::new(FailingStore), "testCookie", "host");
        jar.save_from_response(&lines(&["sid=abc"]));
        assert_eq!(
            jar.cookie_string(),
            "sid=abc",
            "in-memory state survives a persist failure"
        );

        jar.clear();
        assert!(jar.is_empty(), "clear succeeds in memory even when the store fails");
    }
}
