//! Key-value registries resolved from an operation log.
//!
//! Resolution replays every [`RegistryOp`] in the log's total order; the last
//! put for a key wins. Wall clocks play no part, so two peers holding the
//! same operations always agree on every key.
//!
//! A merge only emits `Replicated` when the resolved map changed. Operations
//! that rewrite a key with the value it already resolves to stay silent.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use parlor_core::{resolve, Blake3Hash, Entry, EntryId, LogAddress, RegistryOp};

use crate::error::Result;
use crate::event::RegistryEvent;
use crate::log::EntryLog;
use crate::traits::{ConvergentRegistry, Limit, Mergeable, MergeReport, Payload};

/// A convergent key-value registry.
pub struct Registry<V> {
    log: Arc<EntryLog<RegistryOp<V>>>,
}

impl<V: Payload> Registry<V> {
    pub fn new(log: Arc<EntryLog<RegistryOp<V>>>) -> Self {
        Self { log }
    }

    /// The operation log behind this registry.
    pub fn log(&self) -> &Arc<EntryLog<RegistryOp<V>>> {
        &self.log
    }

    pub async fn put(&self, key: &str, value: V) -> Result<EntryId> {
        self.log.append(RegistryOp::put(key, value)).await
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.log
            .fold(None, |winner, op, _| match op {
                RegistryOp::Put { key: k, value } if k == key => Some(value.clone()),
                _ => winner,
            })
            .await
    }

    pub async fn all(&self) -> BTreeMap<String, V> {
        resolve(self.log.all(Limit::All).await)
    }

    pub async fn merge(&self, entries: Vec<Entry>) -> Result<MergeReport> {
        let before = self.resolved_digest().await;
        let ingested = self.log.ingest(entries).await;
        if ingested.report.changed() && self.resolved_digest().await != before {
            self.log.notify_replicated(ingested.report.added);
        }
        ingested.into_result()
    }

    /// Fetch and merge like [`EntryLog::load`].
    pub async fn load(&self) -> Result<MergeReport> {
        let fetched = self.log.fetch().await?;
        let report = self.merge(fetched).await?;
        self.log.mark_ready();
        Ok(report)
    }

    /// Payload hash of the winning put per key.
    async fn resolved_digest(&self) -> BTreeMap<String, Blake3Hash> {
        self.log
            .fold(BTreeMap::new(), |mut digest, op, entry| {
                digest.insert(op.key().to_string(), entry.header.payload_hash);
                digest
            })
            .await
    }
}

#[async_trait]
impl<V: Payload> Mergeable for Registry<V> {
    fn address(&self) -> LogAddress {
        self.log.address()
    }

    async fn export(&self) -> Vec<Entry> {
        self.log.entries(Limit::All).await
    }

    async fn merge(&self, entries: Vec<Entry>) -> Result<MergeReport> {
        Registry::merge(self, entries).await
    }

    async fn state_hash(&self) -> Blake3Hash {
        self.log.state_hash().await
    }
}

#[async_trait]
impl<V: Payload> ConvergentRegistry<V> for Registry<V> {
    fn name(&self) -> &str {
        self.log.name()
    }

    async fn put(&self, key: &str, value: V) -> Result<EntryId> {
        Registry::put(self, key, value).await
    }

    async fn get(&self, key: &str) -> Option<V> {
        Registry::get(self, key).await
    }

    async fn all(&self) -> BTreeMap<String, V> {
        Registry::all(self).await
    }

    async fn load(&self) -> Result<MergeReport> {
        Registry::load(self).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryEvent<V>> {
        self.log.subscribe()
    }
}
