//! GAAP Cryptographic Primitives
//!
//! Building blocks for the encrypted, signed request envelope used by the GAAP
//! secure transport. Everything in this crate is synchronous and performs no
//! I/O. The only source of nondeterminism is the IV drawn inside
//! [`encrypt`], which callers cannot override.
//!
//! # Envelope Layout
//!
//! A request or response body is a single frame:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────┐
//! │ IV (12 bytes)│ AES-GCM ciphertext || tag (16 bytes) │
//! └──────────────┴──────────────────────────────────────┘
//! ```
//!
//! Requests additionally carry an out-of-band signature in headers:
//!
//! ```text
//! HMAC-SHA256(key, IV || ciphertext || utf8(timestamp) || utf8(nonce))
//! ```
//!
//! The same key material drives both the cipher and the HMAC.
//!
//! # Security
//!
//! Confidentiality and integrity:
//! - AES-GCM with a fresh 96-bit IV per encryption, drawn from the OS RNG
//! - Authentication tag failure is reported as [`CryptoError::IntegrityFailure`]
//!   and never as a parse error
//!
//! Freshness:
//! - The signature binds the ciphertext to a timestamp and a one-time nonce so
//!   a verifier can reject replays without seeing plaintext
//!
//! Key hygiene:
//! - [`KeyMaterial`] only exists after hex and length validation
//! - Key bytes are zeroized on drop and never appear in `Debug` output

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cipher;
mod error;
mod frame;
mod key;
mod signer;

pub use cipher::{IV_SIZE, Sealed, TAG_SIZE, decrypt, encrypt};
pub use error::CryptoError;
pub use frame::{MIN_FRAME_SIZE, Unframed, frame, unframe};
pub use key::{KeyMaterial, KeySize};
pub use signer::{SIGNATURE_HEX_LEN, sign, verify};
