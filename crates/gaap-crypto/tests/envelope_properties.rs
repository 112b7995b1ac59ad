//! Property-based tests for the request envelope
//!
//! These tests verify the invariants the transport relies on:
//!
//! 1. **Round-trip**: decrypt(encrypt(m, k), k) == m for all payloads and key sizes
//! 2. **Signature sensitivity**: flipping any single input byte changes the signature
//! 3. **Framing**: unframe(frame(sealed)) recovers the IV and ciphertext
//! 4. **Key validation**: only 32 or 64 hex characters are accepted

use gaap_crypto::{
    IV_SIZE, KeyMaterial, MIN_FRAME_SIZE, Unframed, decrypt, encrypt, sign, unframe,
};
use proptest::prelude::*;

/// Strategy for generating 128- and 256-bit keys
fn arbitrary_key() -> impl Strategy<Value = KeyMaterial> {
    prop_oneof![
        any::<[u8; 16]>().prop_map(KeyMaterial::from_bytes_128),
        any::<[u8; 32]>().prop_map(KeyMaterial::from_bytes_256),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_encrypt_decrypt_roundtrip(
        plaintext in prop::collection::vec(any::<u8>(), 0..2048),
        key in arbitrary_key(),
    ) {
        let sealed = encrypt(&plaintext, &key).unwrap();
        let decrypted = decrypt(&sealed.ciphertext, &sealed.iv, &key).unwrap();

        prop_assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn prop_framed_payload_decrypts(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        key in arbitrary_key(),
    ) {
        let sealed = encrypt(&plaintext, &key).unwrap();
        let framed = sealed.to_frame();

        prop_assert!(framed.len() >= MIN_FRAME_SIZE);

        let Unframed::Sealed { iv, ciphertext } = unframe(&framed) else {
            return Err(TestCaseError::fail("sealed frame unframed as empty"));
        };
        prop_assert_eq!(iv, sealed.iv);
        prop_assert_eq!(decrypt(ciphertext, &iv, &key).unwrap(), plaintext);
    }

    #[test]
    fn prop_short_bodies_are_empty(body in prop::collection::vec(any::<u8>(), 0..MIN_FRAME_SIZE)) {
        prop_assert_eq!(unframe(&body), Unframed::Empty);
    }

    #[test]
    fn prop_signature_sensitive_to_ciphertext(
        ciphertext in prop::collection::vec(any::<u8>(), 1..256),
        flip_at in any::<prop::sample::Index>(),
        iv in any::<[u8; IV_SIZE]>(),
        key in arbitrary_key(),
    ) {
        let original = sign(&iv, &ciphertext, "1700000000000", "nonce", &key);

        let mut tampered = ciphertext.clone();
        let idx = flip_at.index(tampered.len());
        tampered[idx] ^= 0x01;

        prop_assert_ne!(original, sign(&iv, &tampered, "1700000000000", "nonce", &key));
    }

    #[test]
    fn prop_signature_sensitive_to_iv(
        iv in any::<[u8; IV_SIZE]>(),
        flip_at in 0..IV_SIZE,
        key in arbitrary_key(),
    ) {
        let original = sign(&iv, b"ciphertext", "1700000000000", "nonce", &key);

        let mut tampered = iv;
        tampered[flip_at] ^= 0x80;

        prop_assert_ne!(original, sign(&tampered, b"ciphertext", "1700000000000", "nonce", &key));
    }

    #[test]
    fn prop_signature_sensitive_to_timestamp_and_nonce(
        ts in 0u64..u64::MAX,
        nonce in "[a-f0-9-]{36}",
        key in arbitrary_key(),
    ) {
        let iv = [0u8; IV_SIZE];
        let timestamp = ts.to_string();
        let original = sign(&iv, b"ct", &timestamp, &nonce, &key);

        let next_ts = (ts + 1).to_string();
        prop_assert_ne!(&original, &sign(&iv, b"ct", &next_ts, &nonce, &key));

        let other_nonce = format!("{nonce}x");
        prop_assert_ne!(&original, &sign(&iv, b"ct", &timestamp, &other_nonce, &key));
    }

    #[test]
    fn prop_sign_is_deterministic(
        iv in any::<[u8; IV_SIZE]>(),
        ciphertext in prop::collection::vec(any::<u8>(), 0..128),
        key in arbitrary_key(),
    ) {
        let a = sign(&iv, &ciphertext, "42", "n", &key);
        let b = sign(&iv, &ciphertext, "42", "n", &key);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_only_32_or_64_hex_chars_accepted(len in 0usize..100) {
        let hex_key = "a".repeat(len);
        let accepted = KeyMaterial::from_hex(&hex_key).is_ok();
        prop_assert_eq!(accepted, len == 32 || len == 64);
    }
}
