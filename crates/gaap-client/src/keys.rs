//! Key classes and key resolution.
//!
//! Two classes of key exist and each has its own source:
//!
//! - [`KeyClass::Bootstrap`]: static, from configuration. Only for endpoints
//!   that run before a session exists (login, registration, token refresh).
//! - [`KeyClass::Session`]: issued by the server at login/refresh, read from
//!   the [`CredentialStore`]. Used for every authenticated endpoint.

use std::{fmt, sync::Arc};

use gaap_crypto::KeyMaterial;

use crate::{credentials::CredentialStore, error::ClientError};

/// Which key encrypts and signs a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Pre-shared key provisioned at deploy time
    Bootstrap,
    /// Per-login key issued by the server
    Session,
}

impl fmt::Display for KeyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootstrap => f.write_str("bootstrap"),
            Self::Session => f.write_str("session"),
        }
    }
}

/// Produces validated key material for a [`KeyClass`].
#[derive(Clone)]
pub struct KeyResolver {
    bootstrap_key: Option<Arc<str>>,
    credentials: Arc<CredentialStore>,
}

impl KeyResolver {
    /// Resolver over a configured bootstrap key and a credential store.
    pub fn new(bootstrap_key: Option<&str>, credentials: Arc<CredentialStore>) -> Self {
        Self { bootstrap_key: bootstrap_key.map(Arc::from), credentials }
    }

    /// Resolve and validate the key for `class`.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the bootstrap key is not configured
    /// - `NotAuthenticated` if no session key is stored
    /// - `InvalidKeyMaterial` if the hex is malformed or not 32/64 chars
    pub fn resolve(&self, class: KeyClass) -> Result<KeyMaterial, ClientError> {
        match class {
            KeyClass::Bootstrap => self.resolve_bootstrap(),
            KeyClass::Session => self.resolve_session(),
        }
    }

    /// True if a bootstrap key is configured.
    pub fn has_bootstrap_key(&self) -> bool {
        self.bootstrap_key.is_some()
    }

    fn resolve_bootstrap(&self) -> Result<KeyMaterial, ClientError> {
        let hex_key = self.bootstrap_key.as_deref().ok_or_else(|| {
            ClientError::Configuration(format!(
                "bootstrap key not configured (set {})",
                crate::config::BOOTSTRAP_KEY_VAR
            ))
        })?;

        KeyMaterial::from_hex(hex_key).map_err(|e| ClientError::from_crypto(KeyClass::Bootstrap, e))
    }

    fn resolve_session(&self) -> Result<KeyMaterial, ClientError> {
        let hex_key = self.credentials.session_key().ok_or(ClientError::NotAuthenticated)?;

        KeyMaterial::from_hex(&hex_key).map_err(|e| ClientError::from_crypto(KeyClass::Session, e))
    }
}
