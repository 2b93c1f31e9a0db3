//! CBOR codec for payloads.
//!
//! Everything that leaves memory (staged ephemeral payloads, persisted
//! drafts) is encoded with CBOR via `ciborium`.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors from encoding or decoding payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Serialization failed.
    #[error("CBOR encode failed: {reason}")]
    Encode {
        /// Description of the failure.
        reason: String,
    },

    /// Bytes were not a valid encoding of the expected type.
    #[error("CBOR decode failed: {reason}")]
    Decode {
        /// Description of the failure.
        reason: String,
    },
}

/// Encode a value to CBOR bytes.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtoError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| ProtoError::Encode { reason: e.to_string() })?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtoError> {
    ciborium::from_reader(bytes).map_err(|e| ProtoError::Decode { reason: e.to_string() })
}
