//! In-process mock of the GAAP API.
//!
//! `MockServer` implements [`HttpTransport`] directly, so a `SecureClient`
//! talks to it without sockets. It enforces the same envelope a real server
//! does:
//!
//! - auth endpoints (login, register, refresh) use the bootstrap key
//! - every other endpoint needs `Authorization: Bearer <token>` and uses that
//!   session's key
//! - the signature must verify and the nonce must be unseen
//!
//! Replies are encrypted under the request's key. Errors are JSON
//! `{code, message}` bodies.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`; the only suspension point is the configurable refresh delay.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use bytes::Bytes;
use gaap_client::{
    AUTHORIZATION, HttpRequest, HttpResponse, HttpTransport, MessageCodec, TransportError, X_NONCE,
    X_SIGNATURE, X_TIMESTAMP,
    messages::{
        AuthTokens, GET_PROFILE_PATH, GetUserProfileRes, LOGIN_PATH, LOGOUT_PATH, LoginReqCodec,
        LoginRes, LoginResCodec, REFRESH_TOKEN_PATH, REGISTER_PATH, RefreshTokenReqCodec,
        RefreshTokenRes, RefreshTokenResCodec, RegisterReqCodec, RegisterRes, RegisterResCodec,
        UserProfile,
    },
};
use gaap_crypto::{KeyMaterial, Unframed};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Path prefix the mock expects in front of every endpoint.
const API_PREFIX: &str = "/api";

/// Endpoint that decrypts the request and returns the same plaintext.
pub const ECHO_PATH: &str = "/echo";

/// Password the mock rejects at login.
pub const WRONG_PASSWORD: &str = "wrong";

/// Application code for rejected credentials, sent under HTTP 200.
pub const INVALID_CREDENTIALS_CODE: i64 = 1001;

/// Credentials the server hands out at login, registration or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Bearer token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Hex session key
    pub session_key: String,
}

/// What the server saw for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Endpoint path without the API prefix
    pub path: String,
    /// `X-Nonce`
    pub nonce: String,
    /// `X-Timestamp`
    pub timestamp: String,
    /// `X-Signature`
    pub signature: String,
    /// `Authorization`, if sent
    pub authorization: Option<String>,
}

struct Session {
    email: String,
    session_key: String,
    expired: bool,
}

struct ServerState {
    rng: ChaCha8Rng,
    next_grant: u64,
    seen_nonces: HashSet<String>,
    sessions: HashMap<String, Session>,
    refresh_tokens: HashMap<String, String>,
    queued_grants: VecDeque<Grant>,
    requests: Vec<RecordedRequest>,
    refresh_calls: usize,
    refresh_delay: Duration,
    fail_refresh: bool,
    reject_authenticated: bool,
    corrupt_replies: bool,
}

struct Inner {
    bootstrap_key: String,
    state: Mutex<ServerState>,
}

/// In-process GAAP server.
///
/// Clones share state, so a test keeps one handle for inspection and gives
/// another to the client.
#[derive(Clone)]
pub struct MockServer {
    inner: Arc<Inner>,
}

/// Request that passed envelope checks.
struct Verified {
    path: String,
    key: KeyMaterial,
    plaintext: Vec<u8>,
    bearer: Option<String>,
}

type Reply = Result<Vec<u8>, HttpResponse>;

impl MockServer {
    /// Server accepting `bootstrap_key_hex` for auth endpoints.
    pub fn new(bootstrap_key_hex: &str) -> Self {
        Self::with_seed(bootstrap_key_hex, 0)
    }

    /// Server with a seeded generator for session keys.
    pub fn with_seed(bootstrap_key_hex: &str, seed: u64) -> Self {
        let state = ServerState {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_grant: 1,
            seen_nonces: HashSet::new(),
            sessions: HashMap::new(),
            refresh_tokens: HashMap::new(),
            queued_grants: VecDeque::new(),
            requests: Vec::new(),
            refresh_calls: 0,
            refresh_delay: Duration::ZERO,
            fail_refresh: false,
            reject_authenticated: false,
            corrupt_replies: false,
        };

        Self {
            inner: Arc::new(Inner {
                bootstrap_key: bootstrap_key_hex.to_string(),
                state: Mutex::new(state),
            }),
        }
    }

    /// Hand out exactly `grant` at the next login, registration or refresh.
    pub fn queue_grant(&self, grant: Grant) {
        self.lock().queued_grants.push_back(grant);
    }

    /// Create a live session for `email` without a login round trip.
    pub fn issue_session(&self, email: &str) -> Grant {
        self.lock().issue(email)
    }

    /// Make the server answer 401 for `access_token` from now on.
    pub fn expire_access_token(&self, access_token: &str) {
        if let Some(session) = self.lock().sessions.get_mut(access_token) {
            session.expired = true;
        }
    }

    /// Delay every refresh reply.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.lock().refresh_delay = delay;
    }

    /// Reject every refresh with 401.
    pub fn set_fail_refresh(&self, fail: bool) {
        self.lock().fail_refresh = fail;
    }

    /// Answer 401 to every non-auth endpoint regardless of token.
    pub fn set_reject_authenticated(&self, reject: bool) {
        self.lock().reject_authenticated = reject;
    }

    /// Flip a ciphertext bit in every sealed reply.
    pub fn set_corrupt_replies(&self, corrupt: bool) {
        self.lock().corrupt_replies = corrupt;
    }

    /// Number of refresh-token requests received.
    pub fn refresh_calls(&self) -> usize {
        self.lock().refresh_calls
    }

    /// Every request received, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests received for `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock().requests.iter().filter(|r| r.path == path).cloned().collect()
    }

    /// True if `access_token` belongs to a live session.
    pub fn is_session_live(&self, access_token: &str) -> bool {
        self.lock().sessions.get(access_token).is_some_and(|s| !s.expired)
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn verify(&self, request: &HttpRequest) -> Result<Verified, HttpResponse> {
        let path = request
            .url
            .split_once(API_PREFIX)
            .map(|(_, p)| p.to_string())
            .ok_or_else(|| error(404, 404, "unknown path"))?;
        let nonce = request.header(X_NONCE).unwrap_or_default().to_string();
        let timestamp = request.header(X_TIMESTAMP).unwrap_or_default().to_string();
        let signature = request.header(X_SIGNATURE).unwrap_or_default().to_string();
        let bearer = request
            .header(AUTHORIZATION)
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            path: path.clone(),
            nonce: nonce.clone(),
            timestamp: timestamp.clone(),
            signature: signature.clone(),
            authorization: request.header(AUTHORIZATION).map(str::to_string),
        });

        if nonce.is_empty() || !state.seen_nonces.insert(nonce.clone()) {
            return Err(error(400, 400, "nonce replayed"));
        }

        let key_hex = if is_auth_path(&path) {
            self.inner.bootstrap_key.clone()
        } else {
            if state.reject_authenticated {
                return Err(error(401, 401, "unauthorized"));
            }
            let session = bearer
                .as_ref()
                .and_then(|token| state.sessions.get(token))
                .filter(|s| !s.expired)
                .ok_or_else(|| error(401, 401, "token expired"))?;
            session.session_key.clone()
        };
        drop(state);

        let key = KeyMaterial::from_hex(&key_hex).map_err(|_| error(500, 500, "bad key"))?;
        let Unframed::Sealed { iv, ciphertext } = gaap_crypto::unframe(&request.body) else {
            return Err(error(400, 400, "empty body"));
        };
        if !gaap_crypto::verify(&iv, ciphertext, &timestamp, &nonce, &key, &signature) {
            return Err(error(400, 400, "invalid signature"));
        }
        let plaintext = gaap_crypto::decrypt(ciphertext, &iv, &key)
            .map_err(|_| error(400, 400, "decryption failed"))?;

        Ok(Verified { path, key, plaintext, bearer })
    }

    fn login(&self, plaintext: &[u8]) -> Reply {
        let request = LoginReqCodec::decode(plaintext).map_err(|_| error(400, 400, "bad body"))?;
        if request.password == WRONG_PASSWORD {
            return Err(error(200, INVALID_CREDENTIALS_CODE, "invalid credentials"));
        }

        let grant = self.lock().issue(&request.email);
        let response = LoginRes { auth: Some(tokens(&grant)), user: Some(profile(&request.email)) };
        LoginResCodec::encode(&response).map_err(|_| error(500, 500, "encode failed"))
    }

    fn register(&self, plaintext: &[u8]) -> Reply {
        let request =
            RegisterReqCodec::decode(plaintext).map_err(|_| error(400, 400, "bad body"))?;

        let grant = self.lock().issue(&request.email);
        let user = UserProfile { nickname: request.nickname, ..profile(&request.email) };
        let response = RegisterRes { auth: Some(tokens(&grant)), user: Some(user) };
        RegisterResCodec::encode(&response).map_err(|_| error(500, 500, "encode failed"))
    }

    async fn refresh(&self, plaintext: &[u8]) -> Reply {
        let request =
            RefreshTokenReqCodec::decode(plaintext).map_err(|_| error(400, 400, "bad body"))?;

        let delay = {
            let mut state = self.lock();
            state.refresh_calls += 1;
            state.refresh_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let grant = {
            let mut state = self.lock();
            if state.fail_refresh {
                return Err(error(401, 401, "refresh rejected"));
            }
            let email = state
                .refresh_tokens
                .remove(&request.refresh_token)
                .ok_or_else(|| error(401, 401, "invalid refresh token"))?;
            state.issue(&email)
        };
        tracing::debug!(access_token = %grant.access_token, "mock refresh issued");

        let response = RefreshTokenRes {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            session_key: grant.session_key,
        };
        RefreshTokenResCodec::encode(&response).map_err(|_| error(500, 500, "encode failed"))
    }

    fn logout(&self, bearer: Option<&str>) -> Reply {
        if let Some(token) = bearer {
            let mut state = self.lock();
            state.sessions.remove(token);
        }
        Ok(Vec::new())
    }

    fn profile(&self, bearer: Option<&str>) -> Reply {
        let email = bearer
            .and_then(|token| self.lock().sessions.get(token).map(|s| s.email.clone()))
            .unwrap_or_default();
        let response = GetUserProfileRes { user: Some(profile(&email)) };
        gaap_client::Cbor::<GetUserProfileRes>::encode(&response)
            .map_err(|_| error(500, 500, "encode failed"))
    }

    fn seal(&self, key: &KeyMaterial, plaintext: &[u8]) -> HttpResponse {
        if plaintext.is_empty() {
            return HttpResponse::sealed(200, Bytes::new());
        }
        let Ok(sealed) = gaap_crypto::encrypt(plaintext, key) else {
            return error(500, 500, "encrypt failed");
        };

        let corrupt = self.lock().corrupt_replies;
        let mut frame = sealed.to_frame();
        if corrupt
            && let Some(last) = frame.last_mut()
        {
            *last ^= 0x01;
        }
        HttpResponse::sealed(200, frame)
    }
}

impl ServerState {
    fn issue(&mut self, email: &str) -> Grant {
        let grant = self.queued_grants.pop_front().unwrap_or_else(|| {
            let n = self.next_grant;
            self.next_grant += 1;

            let mut key = [0u8; 32];
            self.rng.fill_bytes(&mut key);
            Grant {
                access_token: format!("access-{n}"),
                refresh_token: format!("refresh-{n}"),
                session_key: hex::encode(key),
            }
        });

        self.sessions.insert(grant.access_token.clone(), Session {
            email: email.to_string(),
            session_key: grant.session_key.clone(),
            expired: false,
        });
        self.refresh_tokens.insert(grant.refresh_token.clone(), email.to_string());
        grant
    }
}

impl HttpTransport for MockServer {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let verified = match self.verify(&request) {
            Ok(verified) => verified,
            Err(rejection) => return Ok(rejection),
        };

        let reply = match verified.path.as_str() {
            LOGIN_PATH => self.login(&verified.plaintext),
            REGISTER_PATH => self.register(&verified.plaintext),
            REFRESH_TOKEN_PATH => self.refresh(&verified.plaintext).await,
            LOGOUT_PATH => self.logout(verified.bearer.as_deref()),
            GET_PROFILE_PATH => self.profile(verified.bearer.as_deref()),
            ECHO_PATH => Ok(verified.plaintext.clone()),
            _ => Err(error(404, 404, "unknown endpoint")),
        };

        Ok(match reply {
            Ok(plaintext) => self.seal(&verified.key, &plaintext),
            Err(rejection) => rejection,
        })
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockServer")
            .field("sessions", &state.sessions.len())
            .field("requests", &state.requests.len())
            .field("refresh_calls", &state.refresh_calls)
            .finish_non_exhaustive()
    }
}

fn is_auth_path(path: &str) -> bool {
    matches!(path, LOGIN_PATH | REGISTER_PATH | REFRESH_TOKEN_PATH)
}

fn error(status: u16, code: i64, message: &str) -> HttpResponse {
    HttpResponse::json_error(status, code, message)
}

fn tokens(grant: &Grant) -> AuthTokens {
    AuthTokens {
        access_token: grant.access_token.clone(),
        refresh_token: grant.refresh_token.clone(),
        session_key: grant.session_key.clone(),
    }
}

fn profile(email: &str) -> UserProfile {
    UserProfile { id: format!("user:{email}"), email: email.to_string(), ..Default::default() }
}
