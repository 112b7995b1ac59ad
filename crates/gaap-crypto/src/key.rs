//! Validated symmetric key material
//!
//! Keys arrive as hex strings (build-time configuration for the bootstrap key,
//! server-issued for the session key). They are validated once, here, and
//! carried as raw bytes from then on.

use std::fmt;

use zeroize::Zeroize;

use crate::error::CryptoError;

/// Hex length of a 128-bit key
const HEX_LEN_128: usize = 32;

/// Hex length of a 256-bit key
const HEX_LEN_256: usize = 64;

/// AES key size selected by the key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    /// 16-byte key (AES-128-GCM)
    Bits128,
    /// 32-byte key (AES-256-GCM)
    Bits256,
}

impl KeySize {
    /// Key length in bytes.
    pub fn byte_len(self) -> usize {
        match self {
            Self::Bits128 => 16,
            Self::Bits256 => 32,
        }
    }
}

/// Raw key bytes, one variant per supported size.
#[derive(Clone)]
pub(crate) enum KeyBytes {
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

/// Symmetric key used for both AES-GCM and HMAC-SHA256.
///
/// # Invariants
///
/// - Decoded length is exactly 16 or 32 bytes
/// - Constructed only through [`KeyMaterial::from_hex`] (or the raw array
///   constructors), so every instance is valid
#[derive(Clone)]
pub struct KeyMaterial {
    bytes: KeyBytes,
}

impl KeyMaterial {
    /// Parse and validate a hex-encoded key.
    ///
    /// Accepts 32 hex characters (128-bit) or 64 hex characters (256-bit),
    /// either case.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyMaterial` if the string is empty, has another length, or
    ///   contains non-hex characters
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let length = hex_key.len();
        if length == 0 {
            return Err(CryptoError::InvalidKeyMaterial { length, reason: "key is empty" });
        }

        if length != HEX_LEN_128 && length != HEX_LEN_256 {
            return Err(CryptoError::InvalidKeyMaterial {
                length,
                reason: "expected 32 (128-bit) or 64 (256-bit) hex chars",
            });
        }

        let bytes = if length == HEX_LEN_128 {
            let mut key = [0u8; 16];
            decode_into(hex_key, &mut key)?;
            KeyBytes::Aes128(key)
        } else {
            let mut key = [0u8; 32];
            decode_into(hex_key, &mut key)?;
            KeyBytes::Aes256(key)
        };

        Ok(Self { bytes })
    }

    /// Key from raw 128-bit bytes.
    pub fn from_bytes_128(key: [u8; 16]) -> Self {
        Self { bytes: KeyBytes::Aes128(key) }
    }

    /// Key from raw 256-bit bytes.
    pub fn from_bytes_256(key: [u8; 32]) -> Self {
        Self { bytes: KeyBytes::Aes256(key) }
    }

    /// AES variant this key selects.
    pub fn size(&self) -> KeySize {
        match self.bytes {
            KeyBytes::Aes128(_) => KeySize::Bits128,
            KeyBytes::Aes256(_) => KeySize::Bits256,
        }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.bytes {
            KeyBytes::Aes128(key) => key,
            KeyBytes::Aes256(key) => key,
        }
    }

    pub(crate) fn key_bytes(&self) -> &KeyBytes {
        &self.bytes
    }
}

/// Decode hex into a key buffer sized by the validated length.
fn decode_into(hex_key: &str, out: &mut [u8]) -> Result<(), CryptoError> {
    hex::decode_to_slice(hex_key, out).map_err(|_| {
        out.zeroize();
        CryptoError::InvalidKeyMaterial { length: hex_key.len(), reason: "key is not valid hex" }
    })
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial").field("size", &self.size()).finish_non_exhaustive()
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for KeyMaterial {}

// Implement Drop to zeroize key material
impl Drop for KeyMaterial {
    fn drop(&mut self) {
        match &mut self.bytes {
            KeyBytes::Aes128(key) => key.zeroize(),
            KeyBytes::Aes256(key) => key.zeroize(),
        }
    }
}
