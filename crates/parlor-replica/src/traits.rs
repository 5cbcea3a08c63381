//! Capability traits for replicated logs and registries.
//!
//! Lifecycle code depends only on these traits and on a [`Backend`] that
//! opens instances of them, so the replication primitive can be swapped at
//! construction time.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use parlor_core::{Blake3Hash, Entry, EntryId, LogAddress, LogKind, PeerId};

use crate::error::Result;
use crate::event::{LogEvent, RegistryEvent};

/// A value that can be stored in a log.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// How many entries to read from a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    /// Every entry.
    #[default]
    All,
    /// The newest `n` entries, still in total order.
    Last(usize),
}

impl Limit {
    /// The index range this limit selects out of `len` ordered items.
    pub fn window(self, len: usize) -> std::ops::Range<usize> {
        match self {
            Limit::All => 0..len,
            Limit::Last(n) => len.saturating_sub(n)..len,
        }
    }
}

/// Negative values mean "all", matching the `-1` convention of callers.
impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        if n < 0 {
            Limit::All
        } else {
            Limit::Last(n as usize)
        }
    }
}

/// Outcome of merging a batch of entries into a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Entries that were new and are now part of the log.
    pub added: usize,
    /// Entries the log already held.
    pub duplicates: usize,
    /// Entries refused by validation or payload decoding.
    pub rejected: usize,
}

impl MergeReport {
    /// Whether the merge changed the entry set.
    pub fn changed(&self) -> bool {
        self.added > 0
    }

    pub fn absorb(&mut self, other: MergeReport) {
        self.added += other.added;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
    }
}

/// Anything backed by a hash-linked entry set that can exchange entries with
/// another replica of itself.
#[async_trait]
pub trait Mergeable: Send + Sync {
    fn address(&self) -> LogAddress;

    /// Every entry held, in total order.
    async fn export(&self) -> Vec<Entry>;

    /// Merge entries from another replica.
    async fn merge(&self, entries: Vec<Entry>) -> Result<MergeReport>;

    /// Hash of the ordered entry ids. Equal hashes mean equal state.
    async fn state_hash(&self) -> Blake3Hash;
}

/// An append-only, convergent log of `V` values.
#[async_trait]
pub trait ConvergentLog<V: Payload>: Mergeable {
    fn name(&self) -> &str;

    /// Append a value. Persistence failures are returned to the caller.
    async fn append(&self, value: V) -> Result<EntryId>;

    /// Values in total order.
    async fn all(&self, limit: Limit) -> Vec<V>;

    async fn len(&self) -> usize;

    /// Pull pending replicated entries. Bounded by the fetch timeout.
    async fn load(&self) -> Result<MergeReport>;

    fn subscribe(&self) -> broadcast::Receiver<LogEvent<V>>;
}

/// An eventually consistent key-value registry of `V` values.
#[async_trait]
pub trait ConvergentRegistry<V: Payload>: Mergeable {
    fn name(&self) -> &str;

    async fn put(&self, key: &str, value: V) -> Result<EntryId>;

    async fn get(&self, key: &str) -> Option<V>;

    /// Every resolved pair.
    async fn all(&self) -> BTreeMap<String, V>;

    /// Pull pending replicated writes. Bounded by the fetch timeout.
    async fn load(&self) -> Result<MergeReport>;

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent<V>>;
}

/// Opens logs and registries for a peer.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    fn peer_id(&self) -> PeerId;

    /// Open (or return the already open) log for `(kind, name)`.
    async fn open_log<V: Payload>(
        &self,
        kind: LogKind,
        name: &str,
    ) -> Result<Arc<dyn ConvergentLog<V>>>;

    /// Open (or return the already open) registry called `name`.
    async fn open_registry<V: Payload>(&self, name: &str)
        -> Result<Arc<dyn ConvergentRegistry<V>>>;

    /// Release open instances. Persisted state is untouched.
    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_from_i64() {
        assert_eq!(Limit::from(-1), Limit::All);
        assert_eq!(Limit::from(-7), Limit::All);
        assert_eq!(Limit::from(0), Limit::Last(0));
        assert_eq!(Limit::from(3), Limit::Last(3));
    }

    #[test]
    fn test_limit_window() {
        assert_eq!(Limit::All.window(5), 0..5);
        assert_eq!(Limit::Last(2).window(5), 3..5);
        assert_eq!(Limit::Last(9).window(5), 0..5);
        assert_eq!(Limit::Last(0).window(5), 5..5);
    }

    #[test]
    fn test_merge_report_absorb() {
        let mut total = MergeReport::default();
        assert!(!total.changed());
        total.absorb(MergeReport {
            added: 2,
            duplicates: 1,
            rejected: 0,
        });
        total.absorb(MergeReport {
            added: 0,
            duplicates: 3,
            rejected: 1,
        });
        assert!(total.changed());
        assert_eq!(total.added, 2);
        assert_eq!(total.duplicates, 4);
        assert_eq!(total.rejected, 1);
    }
}
