//! Error types for replicated logs and registries.

use thiserror::Error;

/// Errors that can occur in replica operations.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] parlor_store::StoreError),

    /// Entry validation failed.
    #[error("validation error: {0}")]
    Validation(#[from] parlor_core::ValidationError),

    /// Payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] parlor_core::CoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Fetch from the transport did not finish in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A log was reopened with a different payload type.
    #[error("log {0} is already open with another payload type")]
    TypeMismatch(String),
}

/// Result type for replica operations.
pub type Result<T> = std::result::Result<T, ReplicaError>;
