//! Wire framing for encrypted payloads.
//!
//! A frame is the IV immediately followed by the ciphertext. There is no
//! length prefix because the IV size is fixed.

use crate::cipher::{IV_SIZE, Sealed, TAG_SIZE};

/// Smallest byte string that can hold a decryptable frame (IV + tag).
pub const MIN_FRAME_SIZE: usize = IV_SIZE + TAG_SIZE;

/// Result of splitting a body into IV and ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unframed<'a> {
    /// Body is long enough to be decrypted
    Sealed {
        /// The 12-byte IV
        iv: [u8; IV_SIZE],
        /// Ciphertext including the GCM tag
        ciphertext: &'a [u8],
    },
    /// Body is shorter than [`MIN_FRAME_SIZE`]
    ///
    /// A legitimate state (an authenticated call with nothing to return), not
    /// an error. Callers must not attempt decryption.
    Empty,
}

/// Concatenate IV and ciphertext into a wire frame.
pub fn frame(iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(IV_SIZE + ciphertext.len());
    buf.extend_from_slice(iv);
    buf.extend_from_slice(ciphertext);
    buf
}

/// Split a wire frame into IV and ciphertext.
///
/// Returns [`Unframed::Empty`] for anything shorter than [`MIN_FRAME_SIZE`].
pub fn unframe(bytes: &[u8]) -> Unframed<'_> {
    if bytes.len() < MIN_FRAME_SIZE {
        return Unframed::Empty;
    }

    let (iv_bytes, ciphertext) = bytes.split_at(IV_SIZE);
    let mut iv = [0u8; IV_SIZE];
    iv.copy_from_slice(iv_bytes);

    Unframed::Sealed { iv, ciphertext }
}

impl Sealed {
    /// Wire frame for this ciphertext.
    pub fn to_frame(&self) -> Vec<u8> {
        frame(&self.iv, &self.ciphertext)
    }
}
