//! Payload encryption using AES-GCM
//!
//! The IV is generated inside [`encrypt`] from the OS RNG. There is no API
//! that accepts a caller-chosen IV for encryption, so IV reuse under a key
//! cannot be introduced by callers.

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, consts::U12},
};

use crate::{
    error::CryptoError,
    key::{KeyBytes, KeyMaterial},
};

/// AES-GCM IV size (12 bytes)
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

/// Output of [`encrypt`]: the IV it drew and the ciphertext with tag appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// The 12-byte IV used for this encryption
    pub iv: [u8; IV_SIZE],
    /// The ciphertext including the 16-byte GCM tag
    pub ciphertext: Vec<u8>,
}

impl Sealed {
    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_SIZE)
    }
}

/// Encrypt a payload with AES-GCM under a fresh random IV.
///
/// AES-128 or AES-256 is selected by the key size.
///
/// # Errors
///
/// - `Entropy` if the OS RNG cannot produce an IV
/// - `EncryptionFailed` if the cipher rejects the payload (exceeds the GCM
///   length limit)
pub fn encrypt(plaintext: &[u8], key: &KeyMaterial) -> Result<Sealed, CryptoError> {
    let mut iv = [0u8; IV_SIZE];
    getrandom::fill(&mut iv).map_err(|e| CryptoError::Entropy { reason: e.to_string() })?;

    let nonce = Nonce::<U12>::from_slice(&iv);
    let ciphertext = match key.key_bytes() {
        KeyBytes::Aes128(bytes) => {
            Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(bytes)).encrypt(nonce, plaintext)
        },
        KeyBytes::Aes256(bytes) => {
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(bytes)).encrypt(nonce, plaintext)
        },
    }
    .map_err(|_| CryptoError::EncryptionFailed { len: plaintext.len() })?;

    Ok(Sealed { iv, ciphertext })
}

/// Decrypt an AES-GCM ciphertext.
///
/// # Errors
///
/// - `IntegrityFailure`: authentication tag did not verify (wrong key,
///   corrupted bytes, or tampering)
pub fn decrypt(
    ciphertext: &[u8],
    iv: &[u8; IV_SIZE],
    key: &KeyMaterial,
) -> Result<Vec<u8>, CryptoError> {
    let nonce = Nonce::<U12>::from_slice(iv);
    match key.key_bytes() {
        KeyBytes::Aes128(bytes) => {
            Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(bytes)).decrypt(nonce, ciphertext)
        },
        KeyBytes::Aes256(bytes) => {
            Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(bytes)).decrypt(nonce, ciphertext)
        },
    }
    .map_err(|_| CryptoError::IntegrityFailure)
}
