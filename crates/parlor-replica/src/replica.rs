//! A peer's view of every log and registry it has opened.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use parlor_core::{Identity, LogAddress, LogKind, PeerId, RegistryOp};
use parlor_store::{EntryStore, LogRecord, MemoryStore};

use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, Result};
use crate::log::{EntryLog, LogContext};
use crate::registry::Registry;
use crate::traits::{Backend, ConvergentLog, ConvergentRegistry, Payload};
use crate::transport::{Offline, ReplicationTransport};

type OpenLog = Arc<dyn Any + Send + Sync>;

/// The default [`Backend`]: logs persisted in an [`EntryStore`] and
/// replicated over a [`ReplicationTransport`].
///
/// Each address is opened at most once; later opens return the same
/// instance so every caller sees one entry set.
pub struct Replica {
    ctx: LogContext,
    open: Mutex<HashMap<LogAddress, OpenLog>>,
}

impl Replica {
    pub fn new(
        identity: Identity,
        store: Arc<dyn EntryStore>,
        transport: Arc<dyn ReplicationTransport>,
        config: ReplicaConfig,
    ) -> Self {
        info!(peer = %identity.peer_id(), "replica started");
        Self {
            ctx: LogContext {
                identity: Arc::new(identity),
                store,
                transport,
                config,
            },
            open: Mutex::new(HashMap::new()),
        }
    }

    /// An offline replica backed by memory. Useful for tests.
    pub fn in_memory(identity: Identity) -> Self {
        Self::new(
            identity,
            Arc::new(MemoryStore::new()),
            Arc::new(Offline),
            ReplicaConfig::default(),
        )
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.ctx.config
    }

    /// Open the log `(kind, name)` as a concrete [`EntryLog`].
    pub async fn entry_log<V: Payload>(&self, kind: LogKind, name: &str) -> Result<Arc<EntryLog<V>>> {
        let address = LogAddress::derive(kind, name);
        let mut open = self.open.lock().await;

        if let Some(existing) = open.get(&address) {
            return Arc::clone(existing)
                .downcast::<EntryLog<V>>()
                .map_err(|_| ReplicaError::TypeMismatch(address.to_hex()));
        }

        let log = Arc::new(EntryLog::<V>::open(kind, name, self.ctx.clone()).await?);
        open.insert(address, Arc::clone(&log) as OpenLog);
        Ok(log)
    }

    /// Open the registry called `name` as a concrete [`Registry`].
    pub async fn registry<V: Payload>(&self, name: &str) -> Result<Arc<Registry<V>>> {
        let log = self
            .entry_log::<RegistryOp<V>>(LogKind::Registry, name)
            .await?;
        Ok(Arc::new(Registry::new(log)))
    }

    /// Logs this peer has ever opened, including ones not open right now.
    pub async fn known_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogRecord>> {
        Ok(self.ctx.store.list_logs(kind).await?)
    }

    /// Forget every open instance. Persisted entries are untouched and come
    /// back on the next open.
    pub async fn close(&self) {
        self.open.lock().await.clear();
    }
}

#[async_trait]
impl Backend for Replica {
    fn peer_id(&self) -> PeerId {
        self.ctx.identity.peer_id()
    }

    async fn open_log<V: Payload>(
        &self,
        kind: LogKind,
        name: &str,
    ) -> Result<Arc<dyn ConvergentLog<V>>> {
        let log: Arc<dyn ConvergentLog<V>> = self.entry_log::<V>(kind, name).await?;
        Ok(log)
    }

    async fn open_registry<V: Payload>(
        &self,
        name: &str,
    ) -> Result<Arc<dyn ConvergentRegistry<V>>> {
        let registry: Arc<dyn ConvergentRegistry<V>> = self.registry::<V>(name).await?;
        Ok(registry)
    }

    async fn close(&self) {
        Replica::close(self).await
    }
}
