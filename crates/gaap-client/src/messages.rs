//! Auth and user messages.
//!
//! Field names follow the server's camelCase schema. Every message is
//! `#[serde(default)]`, so absent fields decode to their zero value and
//! requests can be built from a partial set of fields with
//! `..Default::default()`.

use serde::{Deserialize, Serialize};

use crate::{
    codec::Cbor,
    credentials::{IssuedCredentials, IssuesCredentials},
};

/// Login endpoint (bootstrap key).
pub const LOGIN_PATH: &str = "/auth/login";
/// Registration endpoint (bootstrap key).
pub const REGISTER_PATH: &str = "/auth/register";
/// Token refresh endpoint (bootstrap key).
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";
/// Logout endpoint.
pub const LOGOUT_PATH: &str = "/auth/logout";
/// TOTP secret generation endpoint.
pub const GENERATE_2FA_PATH: &str = "/auth/generate2-f-a";
/// TOTP enable endpoint.
pub const ENABLE_2FA_PATH: &str = "/auth/enable2-f-a";
/// TOTP disable endpoint.
pub const DISABLE_2FA_PATH: &str = "/auth/disable2-f-a";
/// Profile endpoint.
pub const GET_PROFILE_PATH: &str = "/user/get-profile";

/// Tokens and session key issued at login or registration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthTokens {
    /// Bearer token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Hex session key
    pub session_key: String,
}

/// Account profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    /// Account id
    pub id: String,
    /// Login email
    pub email: String,
    /// Display name
    pub nickname: String,
    /// Whether TOTP is required at login
    pub two_factor_enabled: bool,
}

/// `POST /auth/login`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginReq {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
    /// TOTP code, empty if 2FA is off
    pub code: String,
    /// Bot-check token, empty if not required
    pub cf_turnstile_response: String,
}

/// Login reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginRes {
    /// Issued credentials
    pub auth: Option<AuthTokens>,
    /// Logged-in account
    pub user: Option<UserProfile>,
}

/// `POST /auth/register`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterReq {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
    /// Display name
    pub nickname: String,
    /// Bot-check token, empty if not required
    pub cf_turnstile_response: String,
}

/// Registration reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterRes {
    /// Issued credentials
    pub auth: Option<AuthTokens>,
    /// New account
    pub user: Option<UserProfile>,
}

/// `POST /auth/refresh-token`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshTokenReq {
    /// Current refresh token
    pub refresh_token: String,
}

/// Refresh reply. Empty `refresh_token` or `session_key` means "keep the
/// stored one".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshTokenRes {
    /// New bearer token
    pub access_token: String,
    /// Rotated refresh token
    pub refresh_token: String,
    /// Rotated session key
    pub session_key: String,
}

/// `POST /auth/logout`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutReq {}

/// Logout reply (usually an empty body).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRes {}

/// `POST /auth/generate2-f-a`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generate2FAReq {}

/// New TOTP secret.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Generate2FARes {
    /// Base32 TOTP secret
    pub secret: String,
    /// `otpauth://` provisioning URL
    pub qr_code_url: String,
}

/// `POST /auth/enable2-f-a`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Enable2FAReq {
    /// TOTP code proving the secret was enrolled
    pub code: String,
}

/// Enable reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enable2FARes {}

/// `POST /auth/disable2-f-a`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Disable2FAReq {
    /// Current TOTP code
    pub code: String,
    /// Account password
    pub password: String,
}

/// Disable reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disable2FARes {}

/// `POST /user/get-profile`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUserProfileReq {}

/// Profile reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GetUserProfileRes {
    /// Current account
    pub user: Option<UserProfile>,
}

/// CBOR codec for [`LoginReq`].
pub type LoginReqCodec = Cbor<LoginReq>;
/// CBOR codec for [`LoginRes`].
pub type LoginResCodec = Cbor<LoginRes>;
/// CBOR codec for [`RegisterReq`].
pub type RegisterReqCodec = Cbor<RegisterReq>;
/// CBOR codec for [`RegisterRes`].
pub type RegisterResCodec = Cbor<RegisterRes>;
/// CBOR codec for [`RefreshTokenReq`].
pub type RefreshTokenReqCodec = Cbor<RefreshTokenReq>;
/// CBOR codec for [`RefreshTokenRes`].
pub type RefreshTokenResCodec = Cbor<RefreshTokenRes>;

fn from_tokens(tokens: Option<&AuthTokens>) -> Option<IssuedCredentials> {
    tokens.map(|t| IssuedCredentials::from_fields(&t.access_token, &t.refresh_token, &t.session_key))
}

impl IssuesCredentials for LoginRes {
    fn issued_credentials(&self) -> Option<IssuedCredentials> {
        from_tokens(self.auth.as_ref())
    }
}

impl IssuesCredentials for RegisterRes {
    fn issued_credentials(&self) -> Option<IssuedCredentials> {
        from_tokens(self.auth.as_ref())
    }
}

impl IssuesCredentials for RefreshTokenRes {
    fn issued_credentials(&self) -> Option<IssuedCredentials> {
        Some(IssuedCredentials::from_fields(&self.access_token, &self.refresh_token, &self.session_key))
    }
}
