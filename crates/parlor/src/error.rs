//! Error types for the store facade.

use parlor_replica::ReplicaError;
use parlor_store::StoreError;
use thiserror::Error;

/// Errors that can occur during store facade operations.
#[derive(Debug, Error)]
pub enum ParlorError {
    /// Replicated log or registry error.
    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Seed manifest could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Seed manifest is not valid JSON.
    #[error("invalid seed manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The store was closed.
    #[error("store is closed")]
    Closed,
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, ParlorError>;
