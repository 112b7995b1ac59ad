//! Error types for envelope cryptography

use thiserror::Error;

/// Errors from key import, encryption and decryption
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Key string is not a 128 or 256-bit hex key
    ///
    /// Carries the offending length in hex characters so failures are
    /// diagnosable without leaking key bytes.
    #[error("invalid key material: {reason} ({length} hex chars)")]
    InvalidKeyMaterial {
        /// Length of the rejected key string in characters
        length: usize,
        /// What was wrong with it
        reason: &'static str,
    },

    /// Authentication tag did not verify
    ///
    /// Key mismatch, corrupted transport, or tampering.
    #[error("integrity check failed: authentication tag mismatch")]
    IntegrityFailure,

    /// The cipher refused to encrypt the payload
    #[error("encryption failed: payload of {len} bytes rejected")]
    EncryptionFailed {
        /// Plaintext length in bytes
        len: usize,
    },

    /// OS random number generator unavailable
    #[error("entropy source unavailable: {reason}")]
    Entropy {
        /// Error reported by the RNG
        reason: String,
    },
}

impl CryptoError {
    /// Returns true if this error indicates a possible attack or key mismatch
    /// rather than a local misconfiguration.
    pub fn is_security_event(&self) -> bool {
        match self {
            Self::IntegrityFailure => true,

            Self::InvalidKeyMaterial { .. } => false,
            Self::EncryptionFailed { .. } => false,
            Self::Entropy { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_failure_is_security_event() {
        assert!(CryptoError::IntegrityFailure.is_security_event());
    }

    #[test]
    fn key_errors_are_not_security_events() {
        let err = CryptoError::InvalidKeyMaterial { length: 30, reason: "unsupported length" };
        assert!(!err.is_security_event());
    }

    #[test]
    fn error_display_names_length() {
        let err = CryptoError::InvalidKeyMaterial { length: 30, reason: "unsupported length" };
        assert_eq!(err.to_string(), "invalid key material: unsupported length (30 hex chars)");
    }
}
