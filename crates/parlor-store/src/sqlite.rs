//! SQLite implementation of the EntryStore trait.
//!
//! This is the durable backend: one database file per peer. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use parlor_core::{decode_entry, Entry, EntryId, LogAddress, LogKind};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{now_millis, EntryStore, InsertResult, LogRecord};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn encode_heads(heads: &[EntryId]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(heads, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn address_from_blob(blob: Vec<u8>) -> Result<LogAddress> {
    let arr: [u8; 32] = blob
        .try_into()
        .map_err(|_| StoreError::InvalidData("log address is not 32 bytes".into()))?;
    Ok(LogAddress::from_bytes(arr))
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn insert_entry(&self, entry: &Entry, canonical: &[u8]) -> Result<InsertResult> {
        let entry = entry.clone();
        let canonical = canonical.to_vec();

        self.run(move |conn| {
            let entry_id = entry.compute_id();
            let heads = encode_heads(entry.heads())?;

            let changed = conn.execute(
                "INSERT OR IGNORE INTO entries (
                    entry_id, log_address, author, heads, payload, signature,
                    canonical_bytes, ingested_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry_id.as_bytes().as_slice(),
                    entry.log().as_bytes().as_slice(),
                    entry.author().as_bytes().as_slice(),
                    heads,
                    &entry.payload[..],
                    entry.signature.as_bytes().as_slice(),
                    canonical,
                    now_millis(),
                ],
            )?;

            Ok(if changed == 0 {
                InsertResult::AlreadyExists
            } else {
                InsertResult::Inserted
            })
        })
        .await
    }

    async fn get_entry(&self, id: &EntryId) -> Result<Option<Entry>> {
        let id = *id;
        self.run(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT canonical_bytes FROM entries WHERE entry_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            match bytes {
                Some(bytes) => Ok(Some(decode_entry(&bytes)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn has_entry(&self, id: &EntryId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM entries WHERE entry_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn entries_for_log(&self, log: &LogAddress) -> Result<Vec<Entry>> {
        let log = *log;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT canonical_bytes FROM entries
                 WHERE log_address = ?1
                 ORDER BY ingested_at, rowid",
            )?;
            let rows = stmt
                .query_map(params![log.as_bytes().as_slice()], |row| {
                    row.get::<_, Vec<u8>>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.iter()
                .map(|bytes| decode_entry(bytes).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn count_entries(&self, log: &LogAddress) -> Result<usize> {
        let log = *log;
        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE log_address = ?1",
                params![log.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn register_log(&self, address: &LogAddress, kind: LogKind, name: &str) -> Result<()> {
        let address = *address;
        let name = name.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO logs (address, kind, name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    address.as_bytes().as_slice(),
                    kind.to_u8(),
                    name,
                    now_millis()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogRecord>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT address, kind, name, created_at FROM logs
                 WHERE ?1 IS NULL OR kind = ?1
                 ORDER BY created_at, name",
            )?;
            let rows = stmt
                .query_map(params![kind.map(LogKind::to_u8)], |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, u8>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(address, kind, name, created_at)| {
                    Ok(LogRecord {
                        address: address_from_blob(address)?,
                        kind: LogKind::from_u8(kind).ok_or_else(|| {
                            StoreError::InvalidData(format!("unknown log kind {}", kind))
                        })?,
                        name,
                        created_at,
                    })
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::{canonical_bytes, EntryBuilder, Identity};

    fn make_entry(identity: &Identity, log: LogAddress, text: &str, heads: Vec<EntryId>) -> Entry {
        EntryBuilder::new(log)
            .timestamp(1_234_567_890_000)
            .heads(heads)
            .payload(text.as_bytes().to_vec())
            .sign(identity)
    }

    #[tokio::test]
    async fn test_insert_and_get_entry() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = Identity::generate();
        let log = LogAddress::derive(LogKind::Channel, "general");
        let entry = make_entry(&identity, log, "hello", vec![]);
        let id = entry.compute_id();

        let result = store
            .insert_entry(&entry, &canonical_bytes(&entry))
            .await
            .unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let retrieved = store.get_entry(&id).await.unwrap().unwrap();
        assert_eq!(retrieved, entry);
        assert!(store.has_entry(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_idempotent() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = Identity::generate();
        let log = LogAddress::derive(LogKind::Channel, "general");
        let entry = make_entry(&identity, log, "hello", vec![]);
        let canonical = canonical_bytes(&entry);

        assert_eq!(
            store.insert_entry(&entry, &canonical).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(
            store.insert_entry(&entry, &canonical).await.unwrap(),
            InsertResult::AlreadyExists
        );
        assert_eq!(store.count_entries(&log).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entries_for_log_filters() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = Identity::generate();
        let general = LogAddress::derive(LogKind::Channel, "general");
        let random = LogAddress::derive(LogKind::Channel, "random");

        let first = make_entry(&identity, general, "one", vec![]);
        let second = make_entry(&identity, general, "two", vec![first.compute_id()]);
        let other = make_entry(&identity, random, "elsewhere", vec![]);
        for e in [&first, &second, &other] {
            store.insert_entry(e, &canonical_bytes(e)).await.unwrap();
        }

        let entries = store.entries_for_log(&general).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.log() == &general));
    }

    #[tokio::test]
    async fn test_register_and_list_logs() {
        let store = SqliteStore::open_memory().unwrap();
        let general = LogAddress::derive(LogKind::Channel, "general");
        let users = LogAddress::derive(LogKind::Registry, "direct-messages");

        store.register_log(&general, LogKind::Channel, "general").await.unwrap();
        store.register_log(&general, LogKind::Channel, "general").await.unwrap();
        store.register_log(&users, LogKind::Registry, "direct-messages").await.unwrap();

        assert_eq!(store.list_logs(None).await.unwrap().len(), 2);
        let channels = store.list_logs(Some(LogKind::Channel)).await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].address, general);
        assert_eq!(channels[0].name, "general");
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parlor.db");
        let identity = Identity::generate();
        let log = LogAddress::derive(LogKind::Conversation, "alice");
        let entry = make_entry(&identity, log, "secret hello", vec![]);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_entry(&entry, &canonical_bytes(&entry)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.entries_for_log(&log).await.unwrap(), vec![entry]);
    }
}
