//! Account operations over a [`SecureClient`].

use crate::{
    client::{CallOptions, SecureClient},
    codec::Cbor,
    credentials::Credentials,
    env::{Environment, SystemEnv},
    error::ClientError,
    http::HttpTransport,
    keys::KeyClass,
    messages::{
        DISABLE_2FA_PATH, Disable2FAReq, Disable2FARes, ENABLE_2FA_PATH, Enable2FAReq,
        Enable2FARes, GENERATE_2FA_PATH, GET_PROFILE_PATH, Generate2FAReq, Generate2FARes,
        GetUserProfileReq, GetUserProfileRes, LoginReq, LoginRes, RegisterReq, RegisterRes,
    },
};

/// Login, registration and account calls.
///
/// Auth calls use the bootstrap key; everything else uses the session key
/// and recovers from an expired access token transparently.
#[derive(Debug, Clone)]
pub struct AuthService<T, E = SystemEnv> {
    client: SecureClient<T, E>,
}

impl<T: HttpTransport, E: Environment> AuthService<T, E> {
    /// Service over `client`.
    pub fn new(client: SecureClient<T, E>) -> Self {
        Self { client }
    }

    /// Underlying client.
    pub fn client(&self) -> &SecureClient<T, E> {
        &self.client
    }

    /// True if a bootstrap key is configured.
    pub fn is_available(&self) -> bool {
        self.client.is_available()
    }

    /// Log in with email and password.
    ///
    /// `code` is the TOTP code for accounts with 2FA. Stores the issued
    /// credentials.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        code: Option<&str>,
    ) -> Result<LoginRes, ClientError> {
        let request = LoginReq {
            email: email.to_string(),
            password: password.to_string(),
            code: code.unwrap_or_default().to_string(),
            ..Default::default()
        };
        self.client.login(&request).await
    }

    /// Register a new account. Stores the issued credentials.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        nickname: &str,
    ) -> Result<RegisterRes, ClientError> {
        let request = RegisterReq {
            email: email.to_string(),
            password: password.to_string(),
            nickname: nickname.to_string(),
            ..Default::default()
        };
        self.client.register(&request).await
    }

    /// Log out. Credentials are cleared even if the server call fails.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::logout`].
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.client.logout().await
    }

    /// Refresh the access token explicitly.
    ///
    /// Joins an automatic refresh if one is in flight instead of starting a
    /// second one. Returns the credentials stored afterwards.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::refresh_session`].
    pub async fn refresh(&self) -> Result<Credentials, ClientError> {
        self.client.refresh_session().await
    }

    /// Generate a TOTP secret.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn generate_2fa(&self) -> Result<Generate2FARes, ClientError> {
        self.session_call::<Generate2FAReq, Generate2FARes>(GENERATE_2FA_PATH, &Generate2FAReq {})
            .await
    }

    /// Enable 2FA with a code from the enrolled secret.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn enable_2fa(&self, code: &str) -> Result<Enable2FARes, ClientError> {
        let request = Enable2FAReq { code: code.to_string() };
        self.session_call::<Enable2FAReq, Enable2FARes>(ENABLE_2FA_PATH, &request).await
    }

    /// Disable 2FA.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn disable_2fa(
        &self,
        code: &str,
        password: &str,
    ) -> Result<Disable2FARes, ClientError> {
        let request = Disable2FAReq { code: code.to_string(), password: password.to_string() };
        self.session_call::<Disable2FAReq, Disable2FARes>(DISABLE_2FA_PATH, &request).await
    }

    /// Current user's profile.
    ///
    /// # Errors
    ///
    /// See [`SecureClient::call`].
    pub async fn profile(&self) -> Result<GetUserProfileRes, ClientError> {
        self.session_call::<GetUserProfileReq, GetUserProfileRes>(
            GET_PROFILE_PATH,
            &GetUserProfileReq {},
        )
        .await
    }

    /// Snapshot of the stored credentials.
    pub fn stored_credentials(&self) -> Credentials {
        self.client.credentials().snapshot()
    }

    /// Access token and session key are both stored.
    pub fn is_logged_in(&self) -> bool {
        self.client.is_logged_in()
    }

    /// Forget credentials without calling the server.
    pub fn clear_credentials(&self) {
        self.client.credentials().clear();
        self.client.coordinator().reset();
    }

    async fn session_call<Req, Res>(&self, endpoint: &str, request: &Req) -> Result<Res, ClientError>
    where
        Req: serde::Serialize + serde::de::DeserializeOwned + Default + Send + Sync,
        Res: serde::Serialize + serde::de::DeserializeOwned + Default + Send + Sync,
    {
        self.client
            .call::<Cbor<Req>, Cbor<Res>>(
                endpoint,
                request,
                KeyClass::Session,
                CallOptions::for_class(KeyClass::Session),
            )
            .await
    }
}
