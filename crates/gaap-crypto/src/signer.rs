//! Request signatures using HMAC-SHA256
//!
//! # Wire Layout
//!
//! The signed byte string is fixed and order-sensitive:
//!
//! ```text
//! iv || ciphertext || utf8(timestamp) || utf8(nonce)
//! ```
//!
//! Verifiers rebuild exactly this layout. Changing the order breaks every
//! deployed server.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{cipher::IV_SIZE, key::KeyMaterial};

type HmacSha256 = Hmac<Sha256>;

/// Length of a hex-encoded HMAC-SHA256 signature
pub const SIGNATURE_HEX_LEN: usize = 64;

/// Sign an encrypted request.
///
/// Returns the lower-case hex of the raw HMAC-SHA256 digest. Pure and
/// deterministic: the same inputs always produce the same signature.
pub fn sign(
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    timestamp: &str,
    nonce: &str,
    key: &KeyMaterial,
) -> String {
    let mac = keyed_mac(iv, ciphertext, timestamp, nonce, key);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex signature in constant time.
///
/// Returns `false` for malformed hex as well as for a mismatch.
pub fn verify(
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    timestamp: &str,
    nonce: &str,
    key: &KeyMaterial,
    signature_hex: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature_hex) else {
        return false;
    };

    keyed_mac(iv, ciphertext, timestamp, nonce, key).verify_slice(&provided).is_ok()
}

#[allow(clippy::expect_used)]
fn keyed_mac(
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
    timestamp: &str,
    nonce: &str,
    key: &KeyMaterial,
) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("invariant: HMAC-SHA256 accepts keys of any length");

    mac.update(iv);
    mac.update(ciphertext);
    mac.update(timestamp.as_bytes());
    mac.update(nonce.as_bytes());
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> KeyMaterial {
        KeyMaterial::from_bytes_256([0x42; 32])
    }

    #[test]
    fn signature_is_lowercase_hex_of_digest_length() {
        let sig = sign(&[0u8; IV_SIZE], b"ciphertext", "1700000000000", "nonce-1", &test_key());

        assert_eq!(sig.len(), SIGNATURE_HEX_LEN);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn sign_is_deterministic() {
        let iv = [7u8; IV_SIZE];
        let a = sign(&iv, b"payload", "1700000000000", "abc", &test_key());
        let b = sign(&iv, b"payload", "1700000000000", "abc", &test_key());

        assert_eq!(a, b, "same inputs must produce same signature");
    }

    #[test]
    fn layout_matches_manual_concatenation() {
        let iv = [1u8; IV_SIZE];
        let key = test_key();

        let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
        let mut message = Vec::new();
        message.extend_from_slice(&iv);
        message.extend_from_slice(b"ct");
        message.extend_from_slice(b"123");
        message.extend_from_slice(b"n");
        mac.update(&message);
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(sign(&iv, b"ct", "123", "n", &key), expected);
    }

    #[test]
    fn field_boundaries_are_not_interchangeable() {
        // Same concatenated bytes, different field split. The layout has no
        // separators, so this documents that the verifier relies on the
        // fixed IV size and header values rather than framing.
        let iv = [0u8; IV_SIZE];
        let a = sign(&iv, b"ct", "12", "3n", &test_key());
        let b = sign(&iv, b"ct", "123", "n", &test_key());

        assert_eq!(a, b);
    }

    #[test]
    fn different_keys_produce_different_signatures() {
        let iv = [0u8; IV_SIZE];
        let a = sign(&iv, b"ct", "1", "n", &test_key());
        let b = sign(&iv, b"ct", "1", "n", &KeyMaterial::from_bytes_128([0x42; 16]));

        assert_ne!(a, b);
    }

    #[test]
    fn verify_accepts_valid_signature() {
        let iv = [3u8; IV_SIZE];
        let sig = sign(&iv, b"ct", "1700000000000", "n", &test_key());

        assert!(verify(&iv, b"ct", "1700000000000", "n", &test_key(), &sig));
    }

    #[test]
    fn verify_rejects_changed_timestamp() {
        let iv = [3u8; IV_SIZE];
        let sig = sign(&iv, b"ct", "1700000000000", "n", &test_key());

        assert!(!verify(&iv, b"ct", "1700000000001", "n", &test_key(), &sig));
    }

    #[test]
    fn verify_rejects_malformed_hex() {
        assert!(!verify(&[0u8; IV_SIZE], b"ct", "1", "n", &test_key(), "not-hex"));
    }
}
