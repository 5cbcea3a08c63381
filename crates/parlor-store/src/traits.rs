//! EntryStore trait: the abstract interface for entry persistence.
//!
//! Logs keep their working set in memory and write through to a store, so a
//! restarted peer reopens its logs with every entry it has ever accepted.

use async_trait::async_trait;
use parlor_core::{Entry, EntryId, LogAddress, LogKind};

use crate::error::Result;

/// Result of inserting an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Entry was inserted.
    Inserted,
    /// Entry already exists (idempotent - not an error).
    AlreadyExists,
}

/// A log known to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub address: LogAddress,
    pub kind: LogKind,
    pub name: String,
    /// When the log was first opened on this peer (Unix ms).
    pub created_at: i64,
}

/// Async interface for entry persistence.
///
/// # Design Notes
///
/// - **Content addressed**: entries are keyed by [`EntryId`]; inserting the
///   same entry twice returns `AlreadyExists`.
/// - **No ordering**: `entries_for_log` returns entries in ingestion order.
///   Callers derive the total order with [`parlor_core::linearize`].
#[async_trait]
pub trait EntryStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an entry.
    ///
    /// `canonical` is the entry's canonical encoding, cached to avoid
    /// recomputation.
    async fn insert_entry(&self, entry: &Entry, canonical: &[u8]) -> Result<InsertResult>;

    /// Get an entry by its content-addressed ID.
    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>>;

    /// Check if an entry exists by ID.
    async fn has_entry(&self, id: &EntryId) -> Result<bool>;

    /// All entries of one log, in ingestion order.
    async fn entries_for_log(&self, log: &LogAddress) -> Result<Vec<Entry>>;

    /// Number of entries stored for one log.
    async fn count_entries(&self, log: &LogAddress) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that a log exists. Idempotent; the first registration wins.
    async fn register_log(&self, address: &LogAddress, kind: LogKind, name: &str) -> Result<()>;

    /// List known logs, optionally filtered by kind.
    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogRecord>>;
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
