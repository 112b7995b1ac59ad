//! Secure client.
//!
//! [`SecureClient`] performs one encrypted, signed call end to end and owns
//! the recovery path: a 401 triggers at most one refresh (shared by all
//! concurrent callers through the [`RefreshCoordinator`]) followed by exactly
//! one retry.
//!
//! # Call pipeline
//!
//! ```text
//! resolve key ─► encode ─► encrypt ─► sign ─► POST ─► classify reply
//!                                                       │
//!                          Sealed: unframe ─► decrypt ─► decode
//!                          Rejected: ApiError (401 → refresh → retry once)
//! ```
//!
//! Every attempt, including the retry, draws a fresh IV, timestamp and nonce
//! and therefore carries a fresh signature.

use std::sync::Arc;

use bytes::Bytes;
use gaap_crypto::{KeyMaterial, Unframed};

use crate::{
    codec::{Cbor, MessageCodec},
    config::ClientConfig,
    credentials::{CredentialStore, Credentials, IssuesCredentials},
    env::{Environment, SystemEnv},
    error::ClientError,
    http::{
        AUTHORIZATION, CONTENT_TYPE, HttpRequest, HttpTransport, OCTET_STREAM, ServerReply,
        TransportError, X_NONCE, X_SIGNATURE, X_TIMESTAMP,
    },
    keys::{KeyClass, KeyResolver},
    messages::{
        LOGIN_PATH, LOGOUT_PATH, LoginReq, LoginReqCodec, LoginRes, LoginResCodec, LogoutReq,
        LogoutRes, REFRESH_TOKEN_PATH, REGISTER_PATH, RefreshTokenReq, RefreshTokenReqCodec,
        RefreshTokenResCodec, RegisterReq, RegisterReqCodec, RegisterRes, RegisterResCodec,
    },
    observer::{NoopObserver, SessionObserver},
    refresh::{RefreshCoordinator, RefreshOutcome},
};

/// Per-call flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Attach `Authorization: Bearer <access token>` if a token is stored
    pub include_token: bool,
    /// On 401, refresh once and retry once
    pub retry_on_unauth: bool,
}

impl CallOptions {
    /// Defaults for a key class.
    ///
    /// Session calls send the bearer token and recover from 401. Bootstrap
    /// calls do neither: they run before a session exists, and the refresh
    /// call itself must never recurse into another refresh.
    pub fn for_class(class: KeyClass) -> Self {
        let session = class == KeyClass::Session;
        Self { include_token: session, retry_on_unauth: session }
    }
}

/// Encrypted, signed request client.
///
/// Cheap to clone; clones share configuration, transport, credentials and the
/// refresh coordinator.
pub struct SecureClient<T, E = SystemEnv> {
    config: Arc<ClientConfig>,
    transport: Arc<T>,
    env: E,
    credentials: Arc<CredentialStore>,
    keys: KeyResolver,
    coordinator: Arc<RefreshCoordinator>,
    observer: Arc<dyn SessionObserver>,
}

impl<T: HttpTransport> SecureClient<T, SystemEnv> {
    /// Client over the system clock and OS RNG with an empty credential store.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_env(config, transport, SystemEnv::new())
    }
}

impl<T: HttpTransport, E: Environment> SecureClient<T, E> {
    /// Client with a caller-supplied environment.
    pub fn with_env(config: ClientConfig, transport: T, env: E) -> Self {
        let credentials = Arc::new(CredentialStore::new());
        let keys = KeyResolver::new(config.bootstrap_key.as_deref(), Arc::clone(&credentials));

        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            env,
            credentials,
            keys,
            coordinator: Arc::new(RefreshCoordinator::new()),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Use a shared credential store.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<CredentialStore>) -> Self {
        self.keys = KeyResolver::new(self.config.bootstrap_key.as_deref(), Arc::clone(&credentials));
        self.credentials = credentials;
        self
    }

    /// Use a shared refresh coordinator.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: Arc<RefreshCoordinator>) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Receive session-expiry notifications.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Shared credential store.
    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Shared refresh coordinator.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// True if a bootstrap key is configured, i.e. auth calls can be made.
    pub fn is_available(&self) -> bool {
        self.keys.has_bootstrap_key()
    }

    /// Access token and session key are both stored.
    pub fn is_logged_in(&self) -> bool {
        self.credentials.is_logged_in()
    }

    /// Send one encrypted, signed call and decode the reply.
    ///
    /// An empty 2xx body decodes to `Res::Message::default()`.
    ///
    /// # Errors
    ///
    /// - `Configuration` / `NotAuthenticated` / `InvalidKeyMaterial` before
    ///   any network I/O
    /// - `Api` for server rejections; a 401 is only surfaced after the single
    ///   refresh-and-retry (if enabled) did not help
    /// - `Integrity` if the reply fails authentication (never retried)
    /// - `Network`, `Codec`, `Crypto` otherwise
    pub async fn call<Req, Res>(
        &self,
        endpoint: &str,
        request: &Req::Message,
        class: KeyClass,
        options: CallOptions,
    ) -> Result<Res::Message, ClientError>
    where
        Req: MessageCodec,
        Res: MessageCodec,
    {
        match self.send_once::<Req, Res>(endpoint, request, class, options).await {
            Err(err) if options.retry_on_unauth && err.is_unauthorized() => {
                tracing::info!(endpoint, "unauthorized, refreshing session");

                let refresh = move || async move { self.perform_refresh().await.is_ok() };
                match self.coordinator.run(refresh).await {
                    RefreshOutcome::Refreshed => {
                        tracing::debug!(endpoint, "retrying after refresh");
                        let retry = CallOptions { retry_on_unauth: false, ..options };
                        self.send_once::<Req, Res>(endpoint, request, class, retry).await
                    },
                    RefreshOutcome::Failed => Err(err),
                }
            },
            other => other,
        }
    }

    /// Log in with the bootstrap key and store the issued credentials.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn login(&self, request: &LoginReq) -> Result<LoginRes, ClientError> {
        self.authenticate::<LoginReqCodec, LoginResCodec>(LOGIN_PATH, request).await
    }

    /// Register with the bootstrap key and store the issued credentials.
    ///
    /// # Errors
    ///
    /// See [`Self::call`].
    pub async fn register(&self, request: &RegisterReq) -> Result<RegisterRes, ClientError> {
        self.authenticate::<RegisterReqCodec, RegisterResCodec>(REGISTER_PATH, request).await
    }

    /// Log out on the server, then clear credentials regardless of the
    /// outcome.
    ///
    /// # Errors
    ///
    /// The server call's error, after credentials were cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .call::<Cbor<LogoutReq>, Cbor<LogoutRes>>(
                LOGOUT_PATH,
                &LogoutReq {},
                KeyClass::Session,
                CallOptions::for_class(KeyClass::Session),
            )
            .await;

        self.credentials.clear();
        self.coordinator.reset();
        tracing::info!(server_ok = result.is_ok(), "logged out");

        result.map(|_| ())
    }

    async fn authenticate<Req, Res>(
        &self,
        endpoint: &str,
        request: &Req::Message,
    ) -> Result<Res::Message, ClientError>
    where
        Req: MessageCodec,
        Res: MessageCodec,
        Res::Message: IssuesCredentials,
    {
        let response = self
            .call::<Req, Res>(
                endpoint,
                request,
                KeyClass::Bootstrap,
                CallOptions::for_class(KeyClass::Bootstrap),
            )
            .await?;

        match response.issued_credentials() {
            Some(issued) if self.credentials.store_issued(&issued) => {
                tracing::info!(endpoint, "session established");
            },
            _ => tracing::warn!(endpoint, "response carried no access token"),
        }
        self.coordinator.reset();

        Ok(response)
    }

    /// Refresh the session now, sharing any refresh already in flight.
    ///
    /// Goes through the same coordinator as the automatic refresh, so an
    /// explicit refresh never races a 401-driven one. A failure expires the
    /// session exactly as an automatic refresh failure does.
    ///
    /// # Errors
    ///
    /// - `NotAuthenticated` if no refresh token is stored (no network call)
    /// - the refresh call's own error when this call led the refresh
    /// - `RefreshFailed` when the shared refresh failed or was superseded
    pub async fn refresh_session(&self) -> Result<Credentials, ClientError> {
        if self.credentials.refresh_token().is_none() {
            return Err(ClientError::NotAuthenticated);
        }

        let mut leader_result = None;
        let slot = &mut leader_result;
        let outcome = self
            .coordinator
            .run(move || async move {
                let result = self.perform_refresh().await;
                let refreshed = result.is_ok();
                *slot = Some(result);
                refreshed
            })
            .await;

        match (outcome, leader_result) {
            (_, Some(Err(err))) => Err(err),
            (RefreshOutcome::Refreshed, _) => Ok(self.credentials.snapshot()),
            (RefreshOutcome::Failed, _) => {
                Err(ClientError::RefreshFailed { reason: "shared refresh failed" })
            },
        }
    }

    /// Exchange the refresh token for new credentials. Runs only as the
    /// coordinator's leader.
    ///
    /// New credentials are stored only if the refresh token used is still the
    /// stored one; a newer login wins and the refresh settles as failed
    /// without clearing anything.
    async fn perform_refresh(&self) -> Result<(), ClientError> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            tracing::warn!("no refresh token stored");
            self.expire_session(None);
            return Err(ClientError::NotAuthenticated);
        };

        let request = RefreshTokenReq { refresh_token: refresh_token.clone() };
        let attempt = self.send_once::<RefreshTokenReqCodec, RefreshTokenResCodec>(
            REFRESH_TOKEN_PATH,
            &request,
            KeyClass::Bootstrap,
            CallOptions::for_class(KeyClass::Bootstrap),
        );

        let failure = match tokio::time::timeout(self.config.refresh_timeout, attempt).await {
            Ok(Ok(response)) => {
                match response.issued_credentials().filter(|i| i.access_token.is_some()) {
                    Some(issued) => {
                        if self.credentials.store_issued_if_refresh_token(&refresh_token, &issued)
                        {
                            tracing::info!(
                                rotated_session_key = issued.session_key.is_some(),
                                "session refreshed"
                            );
                            return Ok(());
                        }
                        tracing::debug!("credentials replaced during refresh, discarding grant");
                        return Err(ClientError::RefreshFailed {
                            reason: "credentials replaced while the refresh was in flight",
                        });
                    },
                    None => {
                        tracing::warn!("refresh response carried no access token");
                        ClientError::RefreshFailed { reason: "response carried no access token" }
                    },
                }
            },
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "token refresh rejected");
                err
            },
            Err(_) => {
                tracing::warn!(timeout = ?self.config.refresh_timeout, "token refresh timed out");
                ClientError::Network(TransportError::Timeout)
            },
        };

        self.expire_session(Some(&refresh_token));
        Err(failure)
    }

    /// Clear credentials and notify the observer.
    ///
    /// With `failed_token`, only clears if that token is still the stored
    /// one, so a failed refresh cannot wipe a newer login.
    fn expire_session(&self, failed_token: Option<&str>) {
        let cleared = match failed_token {
            Some(token) => self.credentials.clear_if_refresh_token(token),
            None => {
                self.credentials.clear();
                true
            },
        };

        if cleared {
            tracing::warn!("session expired, credentials cleared");
            self.observer.on_session_expired();
        } else {
            tracing::debug!("credentials replaced during refresh, keeping them");
        }
    }

    /// One attempt: no refresh, no retry.
    async fn send_once<Req, Res>(
        &self,
        endpoint: &str,
        request: &Req::Message,
        class: KeyClass,
        options: CallOptions,
    ) -> Result<Res::Message, ClientError>
    where
        Req: MessageCodec,
        Res: MessageCodec,
    {
        let key = self.keys.resolve(class)?;
        let http_request = self.seal::<Req>(endpoint, request, class, options, &key)?;

        tracing::debug!(endpoint, %class, bytes = http_request.body.len(), "sending sealed request");
        let response = self.transport.post(http_request).await?;

        match ServerReply::classify(response) {
            ServerReply::Rejected(api) => {
                tracing::debug!(endpoint, status = api.status, code = api.code, "request rejected");
                Err(api.into())
            },
            ServerReply::Sealed(body) => self.open::<Res>(endpoint, class, &body, &key),
        }
    }

    fn seal<Req: MessageCodec>(
        &self,
        endpoint: &str,
        request: &Req::Message,
        class: KeyClass,
        options: CallOptions,
        key: &KeyMaterial,
    ) -> Result<HttpRequest, ClientError> {
        let plaintext = Req::encode(request)?;
        let sealed =
            gaap_crypto::encrypt(&plaintext, key).map_err(|e| ClientError::from_crypto(class, e))?;

        let timestamp = self.env.wall_clock_millis().to_string();
        let nonce = self.env.request_nonce();
        let signature = gaap_crypto::sign(&sealed.iv, &sealed.ciphertext, &timestamp, &nonce, key);

        let mut headers = vec![
            (CONTENT_TYPE, OCTET_STREAM.to_string()),
            (X_SIGNATURE, signature),
            (X_TIMESTAMP, timestamp),
            (X_NONCE, nonce),
        ];
        if options.include_token
            && let Some(token) = self.credentials.access_token()
        {
            headers.push((AUTHORIZATION, format!("Bearer {token}")));
        }

        Ok(HttpRequest {
            url: self.config.resolve_url(endpoint),
            headers,
            body: Bytes::from(sealed.to_frame()),
        })
    }

    fn open<Res: MessageCodec>(
        &self,
        endpoint: &str,
        class: KeyClass,
        body: &[u8],
        key: &KeyMaterial,
    ) -> Result<Res::Message, ClientError> {
        match gaap_crypto::unframe(body) {
            Unframed::Empty => {
                tracing::debug!(endpoint, bytes = body.len(), "empty reply");
                Ok(Res::Message::default())
            },
            Unframed::Sealed { iv, ciphertext } => {
                let plaintext = gaap_crypto::decrypt(ciphertext, &iv, key).map_err(|e| {
                    tracing::error!(endpoint, %class, "reply failed authentication");
                    ClientError::from_crypto(class, e)
                })?;
                Ok(Res::decode(&plaintext)?)
            },
        }
    }
}

impl<T, E: Clone> Clone for SecureClient<T, E> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            env: self.env.clone(),
            credentials: Arc::clone(&self.credentials),
            keys: self.keys.clone(),
            coordinator: Arc::clone(&self.coordinator),
            observer: Arc::clone(&self.observer),
        }
    }
}

impl<T, E> std::fmt::Debug for SecureClient<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureClient")
            .field("config", &self.config)
            .field("credentials", &self.credentials)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
