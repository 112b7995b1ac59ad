//! End-to-end tests for the secure client against the in-process mock server.
//!
//! Every request here goes through the real envelope: CBOR encode, AES-GCM,
//! HMAC signature, nonce replay checks on the server, and decryption of the
//! reply. The scenarios cover:
//! - Credential storage at login and registration
//! - Transparent refresh-and-retry on 401
//! - Session expiry when the refresh fails
//! - Fatal integrity failures
//! - Key errors that must never reach the network

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use gaap_client::{
    AuthService, CallOptions, Cbor, ClientConfig, ClientError, KeyClass, SecureClient,
    SessionObserver,
    messages::{GET_PROFILE_PATH, REFRESH_TOKEN_PATH},
};
use gaap_harness::{ECHO_PATH, Grant, INVALID_CREDENTIALS_CODE, MockServer, SimEnv, WRONG_PASSWORD};
use serde::{Deserialize, Serialize};

const BOOTSTRAP: &str = "00112233445566778899aabbccddeeff";
const EMAIL: &str = "ada@example.com";

#[derive(Default)]
struct CountingObserver(AtomicUsize);

impl CountingObserver {
    fn expirations(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl SessionObserver for CountingObserver {
    fn on_session_expired(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    server: MockServer,
    auth: AuthService<MockServer, SimEnv>,
    observer: Arc<CountingObserver>,
}

fn fixture() -> Fixture {
    fixture_with_config(
        ClientConfig::default().with_base_url("http://mock.test").with_bootstrap_key(BOOTSTRAP),
    )
}

fn fixture_with_config(config: ClientConfig) -> Fixture {
    let server = MockServer::new(BOOTSTRAP);
    let observer = Arc::new(CountingObserver::default());
    let client = SecureClient::with_env(config, server.clone(), SimEnv::new())
        .with_observer(Arc::clone(&observer) as Arc<dyn SessionObserver>);

    Fixture { server, auth: AuthService::new(client), observer }
}

fn grant(n: u8) -> Grant {
    Grant {
        access_token: format!("A{n}"),
        refresh_token: format!("R{n}"),
        session_key: format!("{n:02x}").repeat(32),
    }
}

async fn logged_in() -> Fixture {
    let fx = fixture();
    fx.server.queue_grant(grant(1));
    fx.auth.login(EMAIL, "pw", None).await.expect("login");
    fx
}

/// Login stores exactly the issued access token, refresh token and session
/// key.
#[tokio::test]
async fn login_stores_issued_credentials() {
    let fx = fixture();
    fx.server.queue_grant(grant(1));

    let res = fx.auth.login(EMAIL, "pw", None).await.expect("login");

    assert_eq!(res.user.expect("user").email, EMAIL);
    let stored = fx.auth.stored_credentials();
    assert_eq!(stored.access_token.as_deref(), Some("A1"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R1"));
    assert_eq!(stored.session_key, Some("01".repeat(32)));
    assert!(fx.auth.is_logged_in());

    // Oracle: auth calls never carry a bearer token
    let login = &fx.server.requests()[0];
    assert_eq!(login.authorization, None);
}

#[tokio::test]
async fn register_stores_issued_credentials() {
    let fx = fixture();
    fx.server.queue_grant(grant(3));

    let res = fx.auth.register(EMAIL, "pw", "ada").await.expect("register");

    assert_eq!(res.user.expect("user").nickname, "ada");
    assert_eq!(fx.auth.stored_credentials().access_token.as_deref(), Some("A3"));
    assert!(fx.auth.is_logged_in());
}

/// Application errors arrive as JSON under HTTP 200 and must not be mistaken
/// for an encrypted body.
#[tokio::test]
async fn rejected_login_is_api_error() {
    let fx = fixture();

    let err = fx.auth.login(EMAIL, WRONG_PASSWORD, None).await.expect_err("wrong password");

    let api = err.api_error().expect("api error");
    assert_eq!(api.code, INVALID_CREDENTIALS_CODE);
    assert_eq!(api.message, "invalid credentials");
    assert!(!fx.auth.is_logged_in());
}

#[tokio::test]
async fn session_call_uses_session_key_and_token() {
    let fx = logged_in().await;

    let profile = fx.auth.profile().await.expect("profile");

    assert_eq!(profile.user.expect("user").email, EMAIL);
    let calls = fx.server.requests_to(GET_PROFILE_PATH);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer A1"));
}

/// An expired access token is refreshed and the call retried; the caller
/// never sees the 401.
#[tokio::test]
async fn expired_token_is_refreshed_transparently() {
    let fx = logged_in().await;
    fx.server.queue_grant(grant(2));
    fx.server.expire_access_token("A1");

    let profile = fx.auth.profile().await.expect("profile after refresh");

    assert_eq!(profile.user.expect("user").email, EMAIL);
    assert_eq!(fx.server.refresh_calls(), 1);

    let stored = fx.auth.stored_credentials();
    assert_eq!(stored.access_token.as_deref(), Some("A2"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R2"));
    assert_eq!(stored.session_key, Some("02".repeat(32)));

    // Oracle: the retry carries the new token; the server decrypted it with
    // the new session key, or the call would have failed
    let calls = fx.server.requests_to(GET_PROFILE_PATH);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].authorization.as_deref(), Some("Bearer A1"));
    assert_eq!(calls[1].authorization.as_deref(), Some("Bearer A2"));

    // Oracle: the refresh itself is a bootstrap call without a bearer token
    let refreshes = fx.server.requests_to(REFRESH_TOKEN_PATH);
    assert_eq!(refreshes.len(), 1);
    assert_eq!(refreshes[0].authorization, None);
}

/// The retry is a new request: fresh nonce, fresh signature.
#[tokio::test]
async fn retry_has_fresh_nonce_and_signature() {
    let fx = logged_in().await;
    fx.server.expire_access_token("A1");

    fx.auth.profile().await.expect("profile after refresh");

    let calls = fx.server.requests_to(GET_PROFILE_PATH);
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0].nonce, calls[1].nonce);
    assert_ne!(calls[0].signature, calls[1].signature);
}

/// A 401 on the retry is surfaced; there is no second refresh.
#[tokio::test]
async fn no_double_retry() {
    let fx = logged_in().await;
    fx.server.set_reject_authenticated(true);

    let err = fx.auth.profile().await.expect_err("still unauthorized");

    assert!(err.is_unauthorized());
    assert_eq!(fx.server.refresh_calls(), 1);
    assert_eq!(fx.server.requests_to(GET_PROFILE_PATH).len(), 2);
    assert_eq!(fx.observer.expirations(), 0, "refresh itself succeeded");
}

/// A failed refresh clears the whole credential set and notifies the
/// observer once.
#[tokio::test]
async fn failed_refresh_expires_session() {
    let fx = logged_in().await;
    fx.server.expire_access_token("A1");
    fx.server.set_fail_refresh(true);

    let err = fx.auth.profile().await.expect_err("refresh fails");

    assert!(err.is_unauthorized());
    assert!(fx.auth.stored_credentials().is_empty());
    assert_eq!(fx.observer.expirations(), 1);
    assert_eq!(fx.server.requests_to(GET_PROFILE_PATH).len(), 1);
}

/// A refresh that fails after a new login must not wipe the new credentials.
#[tokio::test]
async fn stale_refresh_failure_keeps_newer_login() {
    let fx = logged_in().await;
    fx.server.expire_access_token("A1");
    fx.server.set_fail_refresh(true);
    fx.server.set_refresh_delay(Duration::from_millis(50));

    let relogin = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.server.queue_grant(grant(9));
        fx.auth.login(EMAIL, "pw", None).await
    };
    let (profile, login) = tokio::join!(fx.auth.profile(), relogin);

    assert!(profile.expect_err("refresh fails").is_unauthorized());
    login.expect("relogin");
    assert_eq!(fx.auth.stored_credentials().access_token.as_deref(), Some("A9"));
    assert_eq!(fx.observer.expirations(), 0);
}

/// A refresh that succeeds after a new login must not overwrite the new
/// credentials; the original caller sees its 401 and nothing is cleared.
#[tokio::test]
async fn stale_refresh_success_keeps_newer_login() {
    let fx = logged_in().await;
    fx.server.expire_access_token("A1");
    fx.server.set_refresh_delay(Duration::from_millis(50));

    let relogin = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.server.queue_grant(grant(9));
        fx.auth.login(EMAIL, "pw", None).await
    };
    let (profile, login) = tokio::join!(fx.auth.profile(), relogin);

    login.expect("relogin");
    assert!(profile.expect_err("superseded refresh").is_unauthorized());

    // Oracle: the server did issue new tokens, but the client discarded them
    assert_eq!(fx.server.refresh_calls(), 1);
    let stored = fx.auth.stored_credentials();
    assert_eq!(stored.access_token.as_deref(), Some("A9"));
    assert_eq!(stored.refresh_token.as_deref(), Some("R9"));
    assert_eq!(stored.session_key, Some("09".repeat(32)));
    assert_eq!(fx.observer.expirations(), 0);
    assert!(!fx.auth.client().coordinator().is_refreshing());
}

/// An explicit refresh issued while a 401-driven refresh is in flight joins
/// it instead of sending a second refresh.
#[tokio::test]
async fn explicit_refresh_joins_automatic_refresh() {
    let fx = logged_in().await;
    fx.server.queue_grant(grant(2));
    fx.server.expire_access_token("A1");
    fx.server.set_refresh_delay(Duration::from_millis(50));

    let (profile, refreshed) = tokio::join!(fx.auth.profile(), fx.auth.refresh());

    profile.expect("profile after refresh");
    let refreshed = refreshed.expect("shared refresh");
    assert_eq!(refreshed.access_token.as_deref(), Some("A2"));

    // Oracle: rotating refresh tokens would reject a second exchange of R1
    assert_eq!(fx.server.refresh_calls(), 1);
    assert_eq!(fx.server.requests_to(REFRESH_TOKEN_PATH).len(), 1);
    assert_eq!(fx.observer.expirations(), 0);
}

/// A reply that fails authentication is fatal: no refresh, no retry.
#[tokio::test]
async fn corrupted_reply_is_integrity_error() {
    let fx = logged_in().await;
    fx.server.set_corrupt_replies(true);

    let err = fx.auth.profile().await.expect_err("tampered reply");

    assert!(matches!(err, ClientError::Integrity));
    assert!(!err.is_retryable());
    assert_eq!(fx.server.refresh_calls(), 0);
    assert_eq!(fx.server.requests_to(GET_PROFILE_PATH).len(), 1);
    assert!(fx.auth.is_logged_in(), "integrity failure does not log out");
}

#[tokio::test]
async fn session_call_without_login_never_reaches_network() {
    let fx = fixture();

    let err = fx.auth.profile().await.expect_err("not logged in");

    assert!(matches!(err, ClientError::NotAuthenticated));
    assert!(fx.server.requests().is_empty());
}

#[tokio::test]
async fn login_without_bootstrap_key_never_reaches_network() {
    let fx = fixture_with_config(ClientConfig::default().with_base_url("http://mock.test"));
    assert!(!fx.auth.is_available());

    let err = fx.auth.login(EMAIL, "pw", None).await.expect_err("no bootstrap key");

    assert!(matches!(err, ClientError::Configuration(_)));
    assert!(fx.server.requests().is_empty());
}

#[tokio::test]
async fn malformed_session_key_never_reaches_network() {
    let fx = logged_in().await;
    let before = fx.server.requests().len();
    fx.auth.client().credentials().set_session_key(Some("abc".repeat(10)));

    let err = fx.auth.profile().await.expect_err("30-char key");

    assert!(matches!(
        err,
        ClientError::InvalidKeyMaterial { class: KeyClass::Session, length: 30, .. }
    ));
    assert_eq!(fx.server.requests().len(), before);
}

/// Logout's reply is an empty body, which decodes to the default message.
#[tokio::test]
async fn logout_clears_credentials_and_server_session() {
    let fx = logged_in().await;

    fx.auth.logout().await.expect("logout");

    assert!(fx.auth.stored_credentials().is_empty());
    assert!(!fx.server.is_session_live("A1"));
}

#[tokio::test]
async fn logout_clears_credentials_when_server_rejects() {
    let fx = logged_in().await;
    // Wrong key: the server fails signature verification with 400
    fx.auth.client().credentials().set_session_key(Some("ff".repeat(16)));

    let err = fx.auth.logout().await.expect_err("bad signature");

    assert_eq!(err.api_error().map(|a| a.status), Some(400));
    assert!(fx.auth.stored_credentials().is_empty());
}

#[tokio::test]
async fn explicit_refresh_rotates_credentials() {
    let fx = logged_in().await;
    fx.server.queue_grant(grant(4));

    let refreshed = fx.auth.refresh().await.expect("refresh");

    assert_eq!(refreshed.access_token.as_deref(), Some("A4"));
    assert_eq!(fx.server.refresh_calls(), 1);
    assert_eq!(fx.auth.stored_credentials().session_key, Some("04".repeat(32)));
}

#[tokio::test]
async fn explicit_refresh_without_token_fails_locally() {
    let fx = fixture();

    let err = fx.auth.refresh().await.expect_err("no refresh token");

    assert!(matches!(err, ClientError::NotAuthenticated));
    assert!(fx.server.requests().is_empty());
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct Transfer {
    from: String,
    to: String,
    cents: i64,
}

/// Arbitrary message types travel through the same envelope.
#[tokio::test]
async fn custom_message_roundtrips_through_envelope() {
    let fx = logged_in().await;
    let transfer = Transfer { from: "checking".into(), to: "savings".into(), cents: 12_500 };

    let echoed = fx
        .auth
        .client()
        .call::<Cbor<Transfer>, Cbor<Transfer>>(
            ECHO_PATH,
            &transfer,
            KeyClass::Session,
            CallOptions::for_class(KeyClass::Session),
        )
        .await
        .expect("echo");

    assert_eq!(echoed, transfer);
}
