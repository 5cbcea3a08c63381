//! # parlor-store
//!
//! Entry persistence for parlor. Provides a trait-based interface with
//! SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`EntryStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting an entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use parlor_store::{EntryStore, SqliteStore};
//! use parlor_core::{LogAddress, LogKind};
//!
//! async fn example() -> parlor_store::Result<()> {
//!     let store = SqliteStore::open("parlor.db")?;
//!     let general = LogAddress::derive(LogKind::Channel, "general");
//!     store.register_log(&general, LogKind::Channel, "general").await?;
//!     let entries = store.entries_for_log(&general).await?;
//!     println!("{} entries", entries.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{EntryStore, InsertResult, LogRecord};
