//! SQLite schema versions.
//!
//! `MIGRATIONS[i]` moves the schema from version `i` to `i + 1`. The applied
//! version is kept in `schema_migrations`.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::traits::now_millis;

const MIGRATIONS: &[&str] = &[SCHEMA_V1];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Brings `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied = schema_version(conn)?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{applied} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    let tx = conn.transaction()?;
    for (idx, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        let version = idx as u32 + 1;
        debug!(version, "applying schema migration");
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
    }
    tx.commit()?;

    Ok(())
}

fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?)
}

const SCHEMA_V1: &str = r#"
    -- Logs opened on this peer
    CREATE TABLE logs (
        address BLOB PRIMARY KEY,         -- 32 bytes, derived from (kind, name)
        kind INTEGER NOT NULL,            -- LogKind as u8
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    -- Entries of every log
    CREATE TABLE entries (
        entry_id BLOB PRIMARY KEY,        -- 32 bytes, Blake3 hash of canonical bytes
        log_address BLOB NOT NULL,        -- 32 bytes
        author BLOB NOT NULL,             -- 32 bytes, Ed25519 public key
        heads BLOB NOT NULL,              -- CBOR array of entry ids
        payload BLOB NOT NULL,
        signature BLOB NOT NULL,          -- 64 bytes
        canonical_bytes BLOB NOT NULL,    -- full canonical encoding
        ingested_at INTEGER NOT NULL
    );

    CREATE INDEX idx_entries_log ON entries(log_address);
"#;
