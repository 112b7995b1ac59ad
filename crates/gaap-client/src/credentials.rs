//! Credential store for the access token, refresh token and session key.
//!
//! All three fields live behind one lock, so multi-field writes and
//! [`CredentialStore::clear`] are atomic: no reader can observe a partially
//! cleared or partially updated set.

use std::{
    fmt,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Snapshot of the stored credentials.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token for authenticated endpoints
    pub access_token: Option<String>,
    /// Token exchanged for a new access token when the current one expires
    pub refresh_token: Option<String>,
    /// Hex session key for encrypting authenticated calls
    pub session_key: Option<String>,
}

impl Credentials {
    /// Logged in means an access token AND a session key are present.
    ///
    /// An access token without a session key cannot authenticate requests.
    pub fn is_logged_in(&self) -> bool {
        self.access_token.is_some() && self.session_key.is_some()
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.session_key.is_none()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .field("session_key", &self.session_key.is_some())
            .finish()
    }
}

/// Credentials issued by the server in a login, registration or refresh
/// response.
///
/// Empty strings are treated as absent (the wire format has no null).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// New access token
    pub access_token: Option<String>,
    /// New refresh token; keep the stored one when absent
    pub refresh_token: Option<String>,
    /// New session key; keep the stored one when absent
    pub session_key: Option<String>,
}

impl IssuedCredentials {
    /// Build from wire fields, mapping empty strings to `None`.
    pub fn from_fields(access_token: &str, refresh_token: &str, session_key: &str) -> Self {
        fn present(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }

        Self {
            access_token: present(access_token),
            refresh_token: present(refresh_token),
            session_key: present(session_key),
        }
    }
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("access_token", &self.access_token.is_some())
            .field("refresh_token", &self.refresh_token.is_some())
            .field("session_key", &self.session_key.is_some())
            .finish()
    }
}

/// Response messages that carry freshly issued credentials.
pub trait IssuesCredentials {
    /// Credentials in this response, if any.
    fn issued_credentials(&self) -> Option<IssuedCredentials>;
}

/// Process-scoped credential store.
///
/// Shared through `Arc` by every [`crate::SecureClient`] clone and by the
/// refresh path.
///
/// # Invariants
///
/// - `clear()` removes all three fields under one write lock
/// - `store_issued()` writes all present fields under one write lock
#[derive(Default)]
pub struct CredentialStore {
    inner: RwLock<Credentials>,
}

impl CredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `credentials`.
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self { inner: RwLock::new(credentials) }
    }

    /// Current access token.
    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    /// Current session key (hex).
    pub fn session_key(&self) -> Option<String> {
        self.read().session_key.clone()
    }

    /// Consistent copy of all three fields.
    pub fn snapshot(&self) -> Credentials {
        self.read().clone()
    }

    /// Replace the access token.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.write().access_token = Some(token.into());
    }

    /// Replace the refresh token.
    pub fn set_refresh_token(&self, token: impl Into<String>) {
        self.write().refresh_token = Some(token.into());
    }

    /// Replace or remove the session key.
    pub fn set_session_key(&self, key: Option<String>) {
        self.write().session_key = key;
    }

    /// Write every present field of `issued` atomically.
    ///
    /// Returns `false` (and writes nothing) if `issued` has no access token.
    pub fn store_issued(&self, issued: &IssuedCredentials) -> bool {
        let Some(access_token) = issued.access_token.as_ref() else {
            return false;
        };

        apply_issued(&mut self.write(), access_token, issued);
        true
    }

    /// Write `issued` only if the stored refresh token is still
    /// `refresh_token`.
    ///
    /// A refresh that completes after a newer login must not overwrite the
    /// newer credentials. Returns `false` (and writes nothing) on a mismatch
    /// or if `issued` has no access token.
    pub fn store_issued_if_refresh_token(
        &self,
        refresh_token: &str,
        issued: &IssuedCredentials,
    ) -> bool {
        let Some(access_token) = issued.access_token.as_ref() else {
            return false;
        };

        let mut creds = self.write();
        if creds.refresh_token.as_deref() != Some(refresh_token) {
            return false;
        }
        apply_issued(&mut creds, access_token, issued);
        true
    }

    /// Clear all three fields atomically.
    pub fn clear(&self) {
        *self.write() = Credentials::default();
    }

    /// Clear only if the stored refresh token is still `refresh_token`.
    ///
    /// A failed refresh must not log out credentials that a concurrent login
    /// stored in the meantime. Returns `true` if the store was cleared.
    pub fn clear_if_refresh_token(&self, refresh_token: &str) -> bool {
        let mut creds = self.write();
        if creds.refresh_token.as_deref() == Some(refresh_token) {
            *creds = Credentials::default();
            true
        } else {
            false
        }
    }

    /// Access token and session key are both present.
    pub fn is_logged_in(&self) -> bool {
        self.read().is_logged_in()
    }

    // Poisoning only means another thread panicked mid-write; every write
    // here is a single assignment, so the data is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn apply_issued(creds: &mut Credentials, access_token: &str, issued: &IssuedCredentials) {
    creds.access_token = Some(access_token.to_string());
    if let Some(refresh_token) = &issued.refresh_token {
        creds.refresh_token = Some(refresh_token.clone());
    }
    if let Some(session_key) = &issued.session_key {
        creds.session_key = Some(session_key.clone());
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialStore").field(&*self.read()).finish()
    }
}
