//! Message codec seam.
//!
//! The transport is generic over how business messages become bytes. A codec
//! names its message type and supplies `encode`/`decode`; the message type's
//! `Default` is the zero value returned for empty authenticated replies, and
//! struct update syntax (`..Default::default()`) builds a message from a
//! partial set of fields.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Encoding or decoding failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {reason}")]
pub struct CodecError {
    /// `"encode"` or `"decode"`
    pub operation: &'static str,
    /// Serializer error text
    pub reason: String,
}

impl CodecError {
    /// Encoding failure.
    pub fn encode(reason: impl ToString) -> Self {
        Self { operation: "encode", reason: reason.to_string() }
    }

    /// Decoding failure.
    pub fn decode(reason: impl ToString) -> Self {
        Self { operation: "decode", reason: reason.to_string() }
    }
}

/// Structured binary serializer for one message type.
pub trait MessageCodec {
    /// The message type this codec handles.
    type Message: Default + Send + Sync;

    /// Serialize a message.
    fn encode(message: &Self::Message) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a message.
    fn decode(bytes: &[u8]) -> Result<Self::Message, CodecError>;
}

/// CBOR codec for any serde message type.
pub struct Cbor<M>(PhantomData<fn() -> M>);

impl<M> MessageCodec for Cbor<M>
where
    M: Serialize + DeserializeOwned + Default + Send + Sync,
{
    type Message = M;

    fn encode(message: &M) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(message, &mut buf).map_err(CodecError::encode)?;
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<M, CodecError> {
        ciborium::de::from_reader(bytes).map_err(CodecError::decode)
    }
}
