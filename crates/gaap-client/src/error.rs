//! Error types for the secure transport client.
//!
//! Configuration and key errors abort before any network I/O. An unauthorized
//! [`ApiError`] is the only error class that triggers recovery
//! (refresh-and-retry); everything else propagates unchanged.

use gaap_crypto::CryptoError;
use thiserror::Error;

use crate::{codec::CodecError, http::TransportError, keys::KeyClass};

/// HTTP status and JSON code meaning "unauthorized".
const UNAUTHORIZED: u16 = 401;

/// Server-reported error, decoded from a JSON `{code, message}` reply or
/// synthesized from a non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("api error {code} (HTTP {status}): {message}")]
pub struct ApiError {
    /// HTTP status of the reply
    pub status: u16,
    /// Application error code from the body (the status when absent)
    pub code: i64,
    /// Human-readable message from the server
    pub message: String,
}

impl ApiError {
    /// True if either the HTTP status or the body code is 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED || self.code == i64::from(UNAUTHORIZED)
    }
}

/// Errors surfaced by [`crate::SecureClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bootstrap key is not configured
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Session call attempted without a session key
    #[error("not authenticated: session key not available, login first")]
    NotAuthenticated,

    /// Key string failed hex or length validation
    #[error("invalid {class} key: {reason} ({length} hex chars)")]
    InvalidKeyMaterial {
        /// Which key class was being resolved
        class: KeyClass,
        /// Offending length in hex characters
        length: usize,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Response failed AES-GCM authentication
    ///
    /// Key mismatch, corrupted transport, or tampering. Never retried.
    #[error("integrity check failed: response could not be authenticated")]
    Integrity,

    /// Token refresh did not produce usable credentials
    ///
    /// The reply carried no access token, the credentials were replaced
    /// while the refresh was in flight, or a shared refresh failed.
    #[error("token refresh failed: {reason}")]
    RefreshFailed {
        /// Why the refresh was not applied
        reason: &'static str,
    },

    /// Server rejected the request
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transport failed before any response arrived
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// Message could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Local cryptographic failure (entropy, oversize payload)
    #[error("crypto error: {0}")]
    Crypto(CryptoError),
}

impl ClientError {
    /// Map a crypto error, attributing key failures to `class`.
    pub fn from_crypto(class: KeyClass, err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyMaterial { length, reason } => {
                Self::InvalidKeyMaterial { class, length, reason }
            },
            CryptoError::IntegrityFailure => Self::Integrity,
            other => Self::Crypto(other),
        }
    }

    /// True if this is a 401 from the server.
    ///
    /// The only error that triggers refresh-and-retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api(api) if api.is_unauthorized())
    }

    /// Server-provided error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(api) => Some(api),
            _ => None,
        }
    }

    /// Returns true if repeating the same call could succeed.
    ///
    /// Configuration, key, integrity and codec failures are deterministic and
    /// never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api(api) => api.is_unauthorized() || api.status >= 500,

            Self::Configuration(_) => false,
            Self::NotAuthenticated => false,
            Self::InvalidKeyMaterial { .. } => false,
            Self::Integrity => false,
            Self::RefreshFailed { .. } => false,
            Self::Codec(_) => false,
            Self::Crypto(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, code: i64) -> ApiError {
        ApiError { status, code, message: "m".to_string() }
    }

    #[test]
    fn status_401_is_unauthorized() {
        assert!(ClientError::from(api(401, 401)).is_unauthorized());
    }

    #[test]
    fn body_code_401_under_200_is_unauthorized() {
        assert!(ClientError::from(api(200, 401)).is_unauthorized());
    }

    #[test]
    fn forbidden_is_not_unauthorized() {
        assert!(!ClientError::from(api(403, 403)).is_unauthorized());
    }

    #[test]
    fn integrity_maps_from_crypto() {
        let err = ClientError::from_crypto(KeyClass::Session, CryptoError::IntegrityFailure);
        assert!(matches!(err, ClientError::Integrity));
        assert!(!err.is_retryable());
    }

    #[test]
    fn key_error_names_class() {
        let err = ClientError::from_crypto(
            KeyClass::Bootstrap,
            CryptoError::InvalidKeyMaterial { length: 30, reason: "bad length" },
        );
        assert_eq!(err.to_string(), "invalid bootstrap key: bad length (30 hex chars)");
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!ClientError::Configuration("missing".to_string()).is_retryable());
        assert!(!ClientError::NotAuthenticated.is_retryable());
    }

    #[test]
    fn network_errors_are_retryable() {
        let err = ClientError::from(TransportError::Timeout);
        assert!(err.is_retryable());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn api_error_display() {
        let err = ClientError::from(ApiError {
            status: 400,
            code: 1002,
            message: "invalid signature".to_string(),
        });
        assert_eq!(err.to_string(), "api error 1002 (HTTP 400): invalid signature");
    }
}
