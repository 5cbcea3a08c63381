//! Transport abstraction for replication.
//!
//! Discovery and byte-level replication live outside this crate. A log only
//! needs to announce what it appended and fetch what others announced for
//! its address; merging and ordering happen locally.

use async_trait::async_trait;

use parlor_core::{Entry, LogAddress};

use crate::error::Result;

/// Moves entries between peers.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ReplicationTransport: Send + Sync {
    /// Make a locally appended entry available to other peers.
    async fn announce(&self, entry: &Entry) -> Result<()>;

    /// Entries other peers have made available for a log. May include
    /// entries the caller already holds.
    async fn fetch(&self, log: &LogAddress) -> Result<Vec<Entry>>;
}

/// A transport that never talks to anyone.
///
/// Announcements are dropped and fetches return nothing. A replica on this
/// transport still converges with others through explicit
/// [`crate::exchange`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl ReplicationTransport for Offline {
    async fn announce(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, _log: &LogAddress) -> Result<Vec<Entry>> {
        Ok(Vec::new())
    }
}

/// An in-memory replication hub for testing.
///
/// Every connected peer shares one table of announced entries per log.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    use parlor_core::{EntryId, PeerId};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct HubLog {
        seen: HashSet<EntryId>,
        entries: Vec<Entry>,
    }

    /// Shared state for the memory hub.
    #[derive(Default)]
    pub struct MemoryHub {
        logs: RwLock<HashMap<LogAddress, HubLog>>,
        fetch_delay: RwLock<Option<Duration>>,
    }

    impl MemoryHub {
        /// Create a new memory hub.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport connected to this hub.
        pub fn connect(self: &Arc<Self>, peer: PeerId) -> HubTransport {
            HubTransport {
                peer,
                hub: Arc::clone(self),
            }
        }

        /// Delay every subsequent fetch, simulating a slow network.
        pub async fn set_fetch_delay(&self, delay: Option<Duration>) {
            *self.fetch_delay.write().await = delay;
        }

        /// Number of distinct entries announced for a log.
        pub async fn announced(&self, log: &LogAddress) -> usize {
            self.logs
                .read()
                .await
                .get(log)
                .map_or(0, |l| l.entries.len())
        }
    }

    /// A peer's connection to a [`MemoryHub`].
    #[derive(Clone)]
    pub struct HubTransport {
        peer: PeerId,
        hub: Arc<MemoryHub>,
    }

    #[async_trait]
    impl ReplicationTransport for HubTransport {
        async fn announce(&self, entry: &Entry) -> Result<()> {
            let mut logs = self.hub.logs.write().await;
            let log = logs.entry(*entry.log()).or_default();
            if log.seen.insert(entry.compute_id()) {
                log.entries.push(entry.clone());
            }
            Ok(())
        }

        async fn fetch(&self, log: &LogAddress) -> Result<Vec<Entry>> {
            let delay = *self.hub.fetch_delay.read().await;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let logs = self.hub.logs.read().await;
            Ok(logs
                .get(log)
                .map(|l| {
                    l.entries
                        .iter()
                        .filter(|e| e.author() != &self.peer)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use parlor_core::{EntryBuilder, Identity, LogKind};

        #[tokio::test]
        async fn test_hub_fetch_excludes_own_entries() {
            let hub = MemoryHub::new();
            let alice = Identity::from_seed(&[1; 32]);
            let bob = Identity::from_seed(&[2; 32]);
            let a = hub.connect(alice.peer_id());
            let b = hub.connect(bob.peer_id());

            let log = LogAddress::derive(LogKind::Channel, "general");
            let entry = EntryBuilder::new(log).payload(b"hi".to_vec()).sign(&alice);
            a.announce(&entry).await.unwrap();
            a.announce(&entry).await.unwrap();

            assert_eq!(hub.announced(&log).await, 1);
            assert!(a.fetch(&log).await.unwrap().is_empty());
            assert_eq!(b.fetch(&log).await.unwrap(), vec![entry]);
        }

        #[tokio::test]
        async fn test_offline_is_silent() {
            let log = LogAddress::derive(LogKind::Channel, "general");
            assert!(Offline.fetch(&log).await.unwrap().is_empty());
        }
    }
}
