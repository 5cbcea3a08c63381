//! Error types for parlor core primitives.

use thiserror::Error;

use crate::types::{EntryId, LogAddress};

/// Errors from encoding, decoding and signing entries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("payload hash mismatch: expected {expected}, got {actual}")]
    PayloadHashMismatch { expected: String, actual: String },

    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Reasons an entry is refused by a log.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("payload hash does not match header")]
    PayloadHashMismatch,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("heads array exceeds maximum length of {0}")]
    TooManyHeads(usize),

    #[error("heads must be sorted and unique")]
    UnsortedHeads,

    #[error("entry {id} references itself")]
    SelfReference { id: EntryId },

    #[error("entry belongs to log {got}, expected {expected}")]
    WrongLog {
        expected: LogAddress,
        got: LogAddress,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::PayloadHashMismatch { .. } => ValidationError::PayloadHashMismatch,
            CoreError::UnsupportedVersion(v) => ValidationError::UnsupportedVersion(v),
            CoreError::MalformedEntry(msg) => ValidationError::StructuralError(msg),
            CoreError::EncodingError(msg) | CoreError::DecodingError(msg) => {
                ValidationError::StructuralError(msg)
            }
        }
    }
}
