//! In-memory implementation of the EntryStore trait.
//!
//! Same semantics as SQLite but keeps everything in memory with no
//! persistence. Used by tests and ephemeral peers.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use parlor_core::{Entry, EntryId, LogAddress, LogKind};

use crate::error::{Result, StoreError};
use crate::traits::{now_millis, EntryStore, InsertResult, LogRecord};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Entries indexed by ID.
    entries: HashMap<EntryId, Entry>,

    /// Per-log ingestion order.
    by_log: HashMap<LogAddress, Vec<EntryId>>,

    /// Registered logs, in registration order.
    logs: Vec<LogRecord>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn insert_entry(&self, entry: &Entry, _canonical: &[u8]) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let id = entry.compute_id();

        if inner.entries.contains_key(&id) {
            return Ok(InsertResult::AlreadyExists);
        }

        inner.entries.insert(id, entry.clone());
        inner.by_log.entry(*entry.log()).or_default().push(id);
        Ok(InsertResult::Inserted)
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        Ok(self.read()?.entries.get(id).cloned())
    }

    async fn has_entry(&self, id: &EntryId) -> Result<bool> {
        Ok(self.read()?.entries.contains_key(id))
    }

    async fn entries_for_log(&self, log: &LogAddress) -> Result<Vec<Entry>> {
        let inner = self.read()?;
        Ok(inner
            .by_log
            .get(log)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_entries(&self, log: &LogAddress) -> Result<usize> {
        Ok(self.read()?.by_log.get(log).map_or(0, Vec::len))
    }

    async fn register_log(&self, address: &LogAddress, kind: LogKind, name: &str) -> Result<()> {
        let mut inner = self.write()?;
        if inner.logs.iter().any(|l| l.address == *address) {
            return Ok(());
        }
        inner.logs.push(LogRecord {
            address: *address,
            kind,
            name: name.to_string(),
            created_at: now_millis(),
        });
        Ok(())
    }

    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogRecord>> {
        Ok(self
            .read()?
            .logs
            .iter()
            .filter(|l| kind.map_or(true, |k| l.kind == k))
            .cloned()
            .collect())
    }
}
