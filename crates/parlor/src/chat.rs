//! The ChatStore: one entry point over channels, threads and their registries.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parlor_core::{
    ChannelInfo, ChannelRecord, ConversationRecord, EntryId, Identity, MessageEntry, PeerId,
    UserRecord,
};
use parlor_replica::{
    Backend, ConvergentRegistry, Limit, Replica, ReplicationTransport,
};
use parlor_store::SqliteStore;

use crate::channels::ChannelManager;
use crate::config::ParlorConfig;
use crate::error::{ParlorError, Result};
use crate::handles::{ChannelHandle, HandleTable, ThreadHandle};
use crate::router::spawn_registry_router;
use crate::seed::SeedManifest;
use crate::sink::DeliverySink;
use crate::threads::ThreadManager;

/// Registry of channel records, keyed by channel address.
pub const CHANNELS_REGISTRY: &str = "public-channels";

/// Registry of users reachable by direct message, keyed by user address.
pub const USERS_REGISTRY: &str = "direct-messages-users";

/// Registry of conversation secrets, keyed by conversation address.
pub const CONVERSATIONS_REGISTRY: &str = "message-threads";

/// The replicated channel and thread store.
///
/// Created with [`ChatStore::init`] over any [`Backend`], or on disk with
/// [`ChatStore::open`]. Every push goes to the [`DeliverySink`] given at
/// construction.
pub struct ChatStore<B: Backend> {
    backend: Arc<B>,
    channels: Arc<ChannelManager<B>>,
    threads: Arc<ThreadManager<B>>,
    routers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChatStore<Replica> {
    /// Open a store persisted under `config.data_dir`, namespaced by the
    /// identity's peer id, and apply the configured seed manifest.
    pub async fn open(
        config: ParlorConfig,
        identity: Identity,
        transport: Arc<dyn ReplicationTransport>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self> {
        let peer = identity.peer_id();
        std::fs::create_dir_all(config.peer_dir(&peer))?;
        let store = SqliteStore::open(config.database_path(&peer))?;
        debug!(path = %config.database_path(&peer).display(), "opened database");

        let backend = Arc::new(Replica::new(
            identity,
            Arc::new(store),
            transport,
            config.replica.clone(),
        ));
        let chat = Self::init(backend, sink).await?;

        if let Some(path) = &config.seed_manifest {
            chat.load_seed_channels(path).await?;
        }
        Ok(chat)
    }
}

impl<B: Backend> ChatStore<B> {
    /// Open and load the three registries, attach their routers, then open
    /// a handle for every known channel and conversation.
    ///
    /// Registry load failures are logged; the store starts with whatever
    /// state is local.
    pub async fn init(backend: Arc<B>, sink: Arc<dyn DeliverySink>) -> Result<Self> {
        let channel_registry = backend
            .open_registry::<ChannelRecord>(CHANNELS_REGISTRY)
            .await?;
        let users = backend.open_registry::<UserRecord>(USERS_REGISTRY).await?;
        let conversations = backend
            .open_registry::<ConversationRecord>(CONVERSATIONS_REGISTRY)
            .await?;

        load_registry(channel_registry.as_ref()).await;
        load_registry(users.as_ref()).await;
        load_registry(conversations.as_ref()).await;

        let channels = Arc::new(ChannelManager::new(
            Arc::clone(&backend),
            Arc::clone(&channel_registry),
            Arc::new(HandleTable::new()),
            Arc::clone(&sink),
        ));
        let threads = Arc::new(ThreadManager::new(
            Arc::clone(&backend),
            Arc::clone(&users),
            Arc::clone(&conversations),
            Arc::new(HandleTable::new()),
            sink,
        ));

        let routers = vec![
            {
                let channels = Arc::clone(&channels);
                spawn_registry_router(
                    CHANNELS_REGISTRY.to_string(),
                    channel_registry.subscribe(),
                    move || {
                        let channels = Arc::clone(&channels);
                        async move { channels.on_registry_change().await }
                    },
                )
            },
            {
                let threads = Arc::clone(&threads);
                spawn_registry_router(USERS_REGISTRY.to_string(), users.subscribe(), move || {
                    let threads = Arc::clone(&threads);
                    async move { threads.on_users_change().await }
                })
            },
            {
                let threads = Arc::clone(&threads);
                spawn_registry_router(
                    CONVERSATIONS_REGISTRY.to_string(),
                    conversations.subscribe(),
                    move || {
                        let threads = Arc::clone(&threads);
                        async move { threads.on_conversations_change().await }
                    },
                )
            },
        ];

        let opened_channels = channels.initialize_all_known_channels().await;
        let opened_threads = threads.initialize_all_conversations().await;
        info!(
            peer = %backend.peer_id(),
            channels = opened_channels,
            conversations = opened_threads,
            "chat store initialized"
        );

        Ok(Self {
            backend,
            channels,
            threads,
            routers: Mutex::new(routers),
            closed: AtomicBool::new(false),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.backend.peer_id()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn channels(&self) -> &ChannelManager<B> {
        &self.channels
    }

    pub fn threads(&self) -> &ThreadManager<B> {
        &self.threads
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ParlorError::Closed);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Create every channel listed in a JSON seed manifest.
    ///
    /// Returns how many channels were created or already open.
    pub async fn load_seed_channels(&self, path: impl AsRef<Path>) -> Result<usize> {
        let manifest = SeedManifest::from_path(path)?;
        self.apply_seed(&manifest).await
    }

    /// Create every channel in `manifest`.
    pub async fn apply_seed(&self, manifest: &SeedManifest) -> Result<usize> {
        self.ensure_open()?;
        let mut created = 0;
        for info in manifest.channels() {
            if self
                .channels
                .create_channel(&info.address, Some(info.clone()))
                .await?
                .is_some()
            {
                created += 1;
            }
        }
        info!(channels = created, "loaded seed channels");
        Ok(created)
    }

    pub async fn subscribe_for_channel(
        &self,
        address: &str,
        metadata: Option<ChannelInfo>,
    ) -> Result<Option<Arc<ChannelHandle>>> {
        self.ensure_open()?;
        self.channels.subscribe(address, metadata).await
    }

    pub async fn send_message(&self, address: &str, message: MessageEntry) -> Result<Option<EntryId>> {
        self.ensure_open()?;
        self.channels.send_message(address, message).await
    }

    /// Every message of a channel, in log order. Empty for channels without
    /// a live handle.
    pub async fn get_all_channel_messages(&self, address: &str) -> Result<Vec<MessageEntry>> {
        self.get_channel_messages(address, Limit::All).await
    }

    pub async fn get_channel_messages(
        &self,
        address: &str,
        limit: Limit,
    ) -> Result<Vec<MessageEntry>> {
        self.ensure_open()?;
        Ok(self.channels.messages(address, limit).await)
    }

    pub async fn load_all_channel_messages(&self, address: &str) -> Result<()> {
        self.ensure_open()?;
        self.channels.load_all_channel_messages(address).await;
        Ok(())
    }

    /// Push the public channel listing. Later registry changes push it
    /// again on their own.
    pub async fn update_channels(&self) -> Result<()> {
        self.ensure_open()?;
        self.channels.update_channels().await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Direct messages
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_direct_message_user(&self, address: &str, half_key: &str) -> Result<()> {
        self.ensure_open()?;
        self.threads.add_user(address, half_key).await
    }

    pub async fn initialize_conversation(
        &self,
        address: &str,
        encrypted_secret: &str,
    ) -> Result<Option<Arc<ThreadHandle>>> {
        self.ensure_open()?;
        self.threads
            .initialize_conversation(address, encrypted_secret)
            .await
    }

    pub async fn subscribe_for_direct_message_thread(
        &self,
        address: &str,
    ) -> Result<Option<Arc<ThreadHandle>>> {
        self.ensure_open()?;
        self.threads.subscribe(address).await
    }

    pub async fn send_direct_message(
        &self,
        address: &str,
        message: MessageEntry,
    ) -> Result<Option<EntryId>> {
        self.ensure_open()?;
        self.threads.send_direct_message(address, message).await
    }

    pub async fn get_all_direct_messages(&self, address: &str) -> Result<Vec<MessageEntry>> {
        self.ensure_open()?;
        Ok(self.threads.messages(address, Limit::All).await)
    }

    pub async fn list_available_users(&self) -> Result<()> {
        self.ensure_open()?;
        self.threads.list_available_users().await;
        Ok(())
    }

    pub async fn list_private_conversations(&self) -> Result<()> {
        self.ensure_open()?;
        self.threads.list_private_conversations().await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────────────────

    /// Stop every router and drop every handle. Persisted state is kept.
    /// Later calls return [`ParlorError::Closed`].
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.abort_routers();
        self.channels.handles().clear();
        self.threads.handles().clear();
        self.backend.close().await;
        info!(peer = %self.backend.peer_id(), "chat store closed");
    }

    fn abort_routers(&self) {
        let routers = std::mem::take(&mut *self.routers.lock().unwrap_or_else(PoisonError::into_inner));
        for router in routers {
            router.abort();
        }
    }
}

impl<B: Backend> Drop for ChatStore<B> {
    fn drop(&mut self) {
        self.abort_routers();
        self.channels.handles().clear();
        self.threads.handles().clear();
    }
}

async fn load_registry<V: parlor_replica::Payload>(registry: &dyn ConvergentRegistry<V>) {
    if let Err(e) = registry.load().await {
        warn!(registry = registry.name(), error = %e, "registry load failed");
    }
}
