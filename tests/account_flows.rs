//! Login state machine and auto re-login flows against a scripted transport.
//!
//! These tests pin the exact request sequences of the SSO and portal login
//! flows: the CAS handshake, the ticket redirect chain, the VPN fallback,
//! and the re-login-once retry discipline of authenticated requests.

mod support;

use std::sync::Arc;

use campus_session::store::keys;
use campus_session::{
    Account, AuthError, Credentials, KeyValueStore, MemoryStore, PortalAccount, SessionConfig,
    SsoAccount,
};

use support::{ScriptedTransport, cas_login_page, ok, ok_with_cookies, redirect, redirect_with_cookies};

const TOKEN: &str = "LT-1234-abcdef-cas01";
const WELCOME: &str = "<html><body>welcome, student</body></html>";

fn creds() -> Credentials {
    Credentials::new("20240001", "secret-pass")
}

fn sso_account(
    store: &Arc<MemoryStore>,
    transport: &Arc<ScriptedTransport>,
) -> SsoAccount {
    SsoAccount::new(store.clone(), transport.clone(), &SessionConfig::default())
}

fn portal_account(
    store: &Arc<MemoryStore>,
    transport: &Arc<ScriptedTransport>,
) -> PortalAccount {
    PortalAccount::new(store.clone(), transport.clone(), &SessionConfig::default())
}

// ---- SSO login state machine ----

#[tokio::test]
async fn test_sso_login_happy_path_reaches_verified() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        // FetchLoginPage
        ok_with_cookies(&cas_login_page(TOKEN), &["JSESSIONID=route1; Path=/"]),
        // Submit -> ticket redirect
        redirect_with_cookies(
            "https://sso.campus.edu/personal/home?ticket=ST-abc123",
            &["CASTGC=tgt1; Path=/authserver"],
        ),
        // Redirect chain: ticket exchange, then the landing page
        redirect_with_cookies("/personal/home", &["SESSION=s1; Path=/"]),
        ok_with_cookies(WELCOME, &["SESSION=s2; Path=/"]),
        // Verification probe
        ok(WELCOME),
    ]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(Some(creds()), true).await.unwrap();
    assert!(logged_in, "login should reach Verified");
    assert!(account.is_logged_in());

    let requests = transport.requests();
    assert_eq!(requests.len(), 5, "page, submit, 2 hops, probe");

    // The login page and submit hit the CAS endpoint with the service param.
    assert!(requests[0].url.starts_with("https://sso.campus.edu/authserver/login?service="));
    assert_eq!(requests[1].url, requests[0].url);

    // Each hop carries the previous URL as Referer.
    let hop1 = &requests[2];
    assert_eq!(hop1.url, "https://sso.campus.edu/personal/home?ticket=ST-abc123");
    assert!(
        hop1.headers
            .iter()
            .any(|(name, value)| name == "Referer" && value == &requests[0].url),
        "first hop must carry the submit URL as Referer: {:?}",
        hop1.headers
    );
    let hop2 = &requests[3];
    assert_eq!(hop2.url, "https://sso.campus.edu/personal/home");
    assert!(
        hop2.headers
            .iter()
            .any(|(name, value)| name == "Referer" && value == &hop1.url),
        "second hop must carry the first hop as Referer"
    );

    // Hop cookies flow into the next request; the later hop's SESSION wins.
    assert!(hop2.cookies.as_deref().unwrap().contains("SESSION=s1"));
    let probe_cookies = requests[4].cookies.as_deref().unwrap();
    assert!(probe_cookies.contains("SESSION=s2"));
    assert!(!probe_cookies.contains("SESSION=s1"), "latest hop overrides");

    // remember=true persisted the credentials, and the jar was persisted.
    assert_eq!(store.get(keys::SSO_ACCOUNT).as_deref(), Some("20240001"));
    assert_eq!(store.get(keys::SSO_PASSWORD).as_deref(), Some("secret-pass"));
    let jar = store.get(keys::SSO_COOKIE).unwrap();
    assert!(jar.contains("SESSION=s2"), "persisted jar: {jar}");
    assert!(!jar.contains("SESSION=s1"));
}

#[tokio::test]
async fn test_sso_verification_probe_is_authoritative() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok(&cas_login_page(TOKEN)),
        // Submit "succeeds" without a ticket redirect...
        ok(""),
        // ...but the landing page still shows the login form.
        ok(&cas_login_page("LT-fresh")),
    ]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(Some(creds()), false).await.unwrap();
    assert!(!logged_in, "a failed probe is a failed login");
    assert!(!account.is_logged_in());

    // A clean probe failure is terminal: no VPN fallback, no retry.
    assert_eq!(transport.requests().len(), 3);
}

#[tokio::test]
async fn test_sso_falls_back_to_vpn_when_direct_login_breaks() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        // Direct login page loads but carries no transaction token.
        ok("<html>maintenance page</html>"),
        // VPN retry: full flow through the gateway.
        ok_with_cookies(
            &cas_login_page(TOKEN),
            &["wengine_vpn_ticketwebvpn_campus_edu=tkt123; Path=/"],
        ),
        ok(""),
        ok(WELCOME),
    ]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(Some(creds()), false).await.unwrap();
    assert!(logged_in, "the one-shot VPN fallback should succeed");
    assert!(account.uses_vpn(), "a fallback success flips the account into VPN mode");
    assert!(account.vpn_ticket().is_some(), "gateway ticket cookie captured");

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    assert!(requests[0].url.starts_with("https://sso.campus.edu/"));
    assert!(
        requests[1]
            .url
            .starts_with("https://vpn.campus.edu/https/77726476706e69737468656265737421"),
        "VPN URLs carry the encrypted host segment: {}",
        requests[1].url
    );

    // The gateway cookie lands in the VPN jar's persisted scope.
    let vpn_jar = store.get(keys::VPN_COOKIE).unwrap();
    assert!(vpn_jar.contains("wengine_vpn_ticket"), "persisted: {vpn_jar}");
}

#[tokio::test]
async fn test_sso_wrong_credentials_still_one_shot_fallback() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok(&cas_login_page(TOKEN)),
        // CAS rejects the password in direct mode.
        ok("<html>Invalid credentials</html>"),
        // The fallback runs anyway, and also fails at the probe.
        ok(&cas_login_page(TOKEN)),
        ok(""),
        ok(&cas_login_page("LT-fresh")),
    ]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(Some(creds()), false).await.unwrap();
    assert!(!logged_in);
    assert!(!account.uses_vpn(), "mode only flips on a fallback success");
    assert_eq!(transport.requests().len(), 5, "exactly one fallback attempt");
}

#[tokio::test]
async fn test_sso_redirect_chain_bounded_and_not_fatal() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok(&cas_login_page(TOKEN)),
        redirect("https://sso.campus.edu/personal/home?ticket=ST-1"),
        // The gateway keeps redirecting past the hop bound.
        redirect("https://sso.campus.edu/hop2"),
        redirect("https://sso.campus.edu/hop3"),
        redirect("https://sso.campus.edu/hop4"),
        redirect("https://sso.campus.edu/hop5"),
        redirect("https://sso.campus.edu/hop6"),
        // Verification probe still decides - and passes.
        ok(WELCOME),
    ]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(Some(creds()), false).await.unwrap();
    assert!(logged_in, "an exhausted chain is not itself a failure");

    let requests = transport.requests();
    // page + submit + exactly MAX_REDIRECT_HOPS hops + probe
    assert_eq!(requests.len(), 2 + campus_session::MAX_REDIRECT_HOPS + 1);
    assert_eq!(requests[6].url, "https://sso.campus.edu/hop5");
}

#[tokio::test]
async fn test_sso_login_without_credentials_fails_closed() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([]);

    let mut account = sso_account(&store, &transport);
    let logged_in = account.login(None, false).await.unwrap();
    assert!(!logged_in);
    assert!(transport.requests().is_empty(), "no credentials, no traffic");
}

#[tokio::test]
async fn test_sso_ensure_logged_in_raises_needs_login() {
    let store = Arc::new(MemoryStore::new());
    // The probe shows the login form and there are no stored credentials.
    let transport = ScriptedTransport::new([ok(&cas_login_page(TOKEN))]);

    let mut account = sso_account(&store, &transport);
    let result = account.ensure_logged_in().await;
    assert!(matches!(result, Err(AuthError::NeedsLogin)));
    assert_eq!(transport.requests().len(), 1);
}

// ---- Auto re-login on authenticated requests ----

#[tokio::test]
async fn test_sso_authenticated_get_relogs_in_once_and_retries_once() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::SSO_ACCOUNT, "20240001").unwrap();
    store.set(keys::SSO_PASSWORD, "secret-pass").unwrap();

    let transport = ScriptedTransport::new([
        // ensure_logged_in: probe says the old session is live
        ok(WELCOME),
        // ...but the actual request bounces to the login page
        redirect("https://sso.campus.edu/authserver/login?service=x"),
        // transparent re-login with the persisted credentials
        ok(&cas_login_page(TOKEN)),
        ok(""),
        ok(WELCOME),
        // single retry of the original request
        ok("grades: all pass"),
    ]);

    let mut account = sso_account(&store, &transport);
    let response = account.authenticated_get("/portal/grades").await.unwrap();
    assert_eq!(response.body, "grades: all pass");

    let requests = transport.requests();
    assert_eq!(requests.len(), 6, "exactly one re-login and one retry");
    assert_eq!(requests[1].url, "https://sso.campus.edu/portal/grades");
    assert_eq!(requests[5].url, "https://sso.campus.edu/portal/grades");
}

#[tokio::test]
async fn test_sso_authenticated_get_second_bounce_propagates_needs_login() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::SSO_ACCOUNT, "20240001").unwrap();
    store.set(keys::SSO_PASSWORD, "secret-pass").unwrap();

    let transport = ScriptedTransport::new([
        ok(WELCOME),
        redirect("https://sso.campus.edu/authserver/login?service=x"),
        ok(&cas_login_page(TOKEN)),
        ok(""),
        ok(WELCOME),
        // the retry bounces again
        redirect("https://sso.campus.edu/authserver/login?service=x"),
    ]);

    let mut account = sso_account(&store, &transport);
    let result = account.authenticated_get("/portal/grades").await;
    assert!(matches!(result, Err(AuthError::NeedsLogin)));
    assert_eq!(
        transport.requests().len(),
        6,
        "no unbounded retry loops: one re-login, one retry, then give up"
    );
}

// ---- Portal account ----

#[tokio::test]
async fn test_portal_login_persists_and_relogs_with_stored_credentials() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok_with_cookies("<form id=\"loginForm\"></form>", &["EASSESS=e1; Path=/"]),
        ok(""),
        ok("<html>home</html>"),
    ]);

    let mut account = portal_account(&store, &transport);
    assert!(account.login(Some(creds()), true).await.unwrap());
    assert_eq!(transport.requests().len(), 3, "page, submit, probe");
    assert_eq!(store.get(keys::PORTAL_ACCOUNT).as_deref(), Some("20240001"));
    assert!(store.get(keys::PORTAL_COOKIE).unwrap().contains("EASSESS=e1"));

    // A fresh account (new process) logs in with the persisted credentials.
    let transport = ScriptedTransport::new([
        ok("<form id=\"loginForm\"></form>"),
        ok(""),
        ok("<html>home</html>"),
    ]);
    let mut fresh = portal_account(&store, &transport);
    assert!(fresh.login(None, false).await.unwrap());
}

#[tokio::test]
async fn test_portal_rejected_credentials_resolve_to_false() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok("<form id=\"loginForm\"></form>"),
        ok("<html>account or password incorrect</html>"),
    ]);

    let mut account = portal_account(&store, &transport);
    assert!(!account.login(Some(creds()), false).await.unwrap());
    assert!(!account.is_logged_in());
    assert_eq!(transport.requests().len(), 2, "rejection skips the probe");
}

#[tokio::test]
async fn test_portal_authenticated_get_retries_once() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::PORTAL_ACCOUNT, "20240001").unwrap();
    store.set(keys::PORTAL_PASSWORD, "secret-pass").unwrap();

    let transport = ScriptedTransport::new([
        ok("<html>home</html>"),
        redirect("/eas/login?expired=1"),
        ok("<form id=\"loginForm\"></form>"),
        ok(""),
        ok("<html>home</html>"),
        ok("timetable"),
    ]);

    let mut account = portal_account(&store, &transport);
    let response = account.authenticated_get("/eas/timetable").await.unwrap();
    assert_eq!(response.body, "timetable");
    assert_eq!(transport.requests().len(), 6);
}

#[tokio::test]
async fn test_logout_clears_jars_and_flag() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::new([
        ok_with_cookies(&cas_login_page(TOKEN), &["JSESSIONID=j1"]),
        ok(""),
        ok(WELCOME),
    ]);

    let mut account = sso_account(&store, &transport);
    assert!(account.login(Some(creds()), false).await.unwrap());
    assert!(store.get(keys::SSO_COOKIE).is_some());

    account.logout();
    assert!(!account.is_logged_in());
    assert!(store.get(keys::SSO_COOKIE).is_none(), "persisted jar removed");
}
