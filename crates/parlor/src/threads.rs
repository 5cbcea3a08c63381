//! Direct-message threads: users, conversations and their logs.
//!
//! Mirrors the channel lifecycle with two registries: the users that can be
//! messaged (address to half key) and the conversations that exist (address
//! to encrypted session secret).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use parlor_core::{ConversationRecord, EntryId, LogKind, MessageEntry, UserRecord};
use parlor_replica::{Backend, ConvergentRegistry, Limit};

use crate::error::Result;
use crate::handles::{Handle, HandleTable, ThreadHandle};
use crate::router::{attach_log_router, deliver, push_snapshot, Scope};
use crate::sink::{DeliveryEvent, DeliverySink};

/// Manages conversation logs and the user and conversation registries.
pub struct ThreadManager<B: Backend> {
    backend: Arc<B>,
    users: Arc<dyn ConvergentRegistry<UserRecord>>,
    conversations: Arc<dyn ConvergentRegistry<ConversationRecord>>,
    handles: Arc<HandleTable>,
    sink: Arc<dyn DeliverySink>,
}

impl<B: Backend> ThreadManager<B> {
    pub fn new(
        backend: Arc<B>,
        users: Arc<dyn ConvergentRegistry<UserRecord>>,
        conversations: Arc<dyn ConvergentRegistry<ConversationRecord>>,
        handles: Arc<HandleTable>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            backend,
            users,
            conversations,
            handles,
            sink,
        }
    }

    pub fn users(&self) -> &Arc<dyn ConvergentRegistry<UserRecord>> {
        &self.users
    }

    pub fn conversations(&self) -> &Arc<dyn ConvergentRegistry<ConversationRecord>> {
        &self.conversations
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// Register a user that can be messaged directly.
    pub async fn add_user(&self, address: &str, half_key: &str) -> Result<()> {
        if address.is_empty() {
            warn!("no user address, can't add user");
            return Ok(());
        }
        self.users
            .put(
                address,
                UserRecord {
                    half_key: half_key.to_string(),
                },
            )
            .await?;
        debug!(user = address, "added direct message user");
        Ok(())
    }

    /// Open the conversation log for `address`.
    ///
    /// Returns `None` for an empty address. Concurrent calls for one address
    /// share a single creation.
    pub async fn create_thread(&self, address: &str) -> Result<Option<Arc<ThreadHandle>>> {
        if address.is_empty() {
            warn!("no conversation address, can't create thread");
            return Ok(None);
        }

        let slot = self.handles.slot(address);
        let handle = slot.get_or_try_init(|| self.open_thread(address)).await?;
        Ok(Some(Arc::clone(handle)))
    }

    async fn open_thread(&self, address: &str) -> Result<Arc<ThreadHandle>> {
        let log = self
            .backend
            .open_log::<MessageEntry>(LogKind::Conversation, address)
            .await?;
        if let Err(e) = log.load().await {
            warn!(conversation = address, error = %e, "conversation load failed");
        }
        debug!(conversation = address, "created direct message thread");
        Ok(Arc::new(Handle::new(address, log)))
    }

    /// Create the conversation log, record its secret and subscribe.
    ///
    /// Every step is a no-op when already done, so retrying after a partial
    /// failure is safe.
    pub async fn initialize_conversation(
        &self,
        address: &str,
        encrypted_secret: &str,
    ) -> Result<Option<Arc<ThreadHandle>>> {
        if self.create_thread(address).await?.is_none() {
            return Ok(None);
        }

        let record = ConversationRecord {
            address: address.to_string(),
            encrypted_secret: encrypted_secret.to_string(),
        };
        if self.conversations.get(address).await.as_ref() != Some(&record) {
            self.conversations.put(address, record).await?;
            info!(conversation = address, "initialized conversation");
        }

        self.subscribe(address).await
    }

    async fn ensure_subscribed(&self, address: &str) -> Result<Option<(Arc<ThreadHandle>, bool)>> {
        let handle = match self.create_thread(address).await? {
            Some(handle) => handle,
            None => {
                warn!(conversation = address, "can't subscribe to direct messages thread");
                return Ok(None);
            }
        };

        let attached = attach_log_router(&handle, Scope::Conversation, Arc::clone(&self.sink));
        if attached {
            info!(conversation = address, "subscribed to direct messages thread");
        }
        Ok(Some((handle, attached)))
    }

    /// Subscribe to a conversation and push its current messages.
    pub async fn subscribe(&self, address: &str) -> Result<Option<Arc<ThreadHandle>>> {
        match self.ensure_subscribed(address).await? {
            Some((handle, _)) => {
                push_snapshot(self.sink.as_ref(), Scope::Conversation, &handle).await;
                Ok(Some(handle))
            }
            None => Ok(None),
        }
    }

    /// Append a direct message, subscribing first if needed.
    pub async fn send_direct_message(
        &self,
        address: &str,
        message: MessageEntry,
    ) -> Result<Option<EntryId>> {
        let handle = match self.ensure_subscribed(address).await? {
            Some((handle, attached)) => {
                if attached {
                    push_snapshot(self.sink.as_ref(), Scope::Conversation, &handle).await;
                }
                handle
            }
            None => return Ok(None),
        };
        Ok(Some(handle.log().append(message).await?))
    }

    /// Messages of a conversation with a live handle, in log order.
    pub async fn messages(&self, address: &str, limit: Limit) -> Vec<MessageEntry> {
        match self.handles.get(address) {
            Some(handle) => handle.log().all(limit).await,
            None => Vec::new(),
        }
    }

    /// Open a handle for every registered conversation that has none.
    pub async fn initialize_all_conversations(&self) -> usize {
        let mut created = 0;
        for address in self.conversations.all().await.into_keys() {
            if self.handles.contains(&address) {
                continue;
            }
            match self.create_thread(&address).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(conversation = %address, error = %e, "failed to open known conversation")
                }
            }
        }
        debug!(created, "initialized known conversations");
        created
    }

    /// Load the users registry and push its contents.
    pub async fn list_available_users(&self) {
        if let Err(e) = self.users.load().await {
            warn!(error = %e, "users registry load failed");
        }
        self.push_users().await;
    }

    /// Load the conversations registry and push its contents.
    pub async fn list_private_conversations(&self) {
        if let Err(e) = self.conversations.load().await {
            warn!(error = %e, "conversations registry load failed");
        }
        self.push_conversations().await;
    }

    async fn push_users(&self) {
        let users: BTreeMap<String, UserRecord> = self.users.all().await;
        deliver(self.sink.as_ref(), DeliveryEvent::AvailableUsers { users }).await;
    }

    async fn push_conversations(&self) {
        let conversations = self.conversations.all().await;
        deliver(
            self.sink.as_ref(),
            DeliveryEvent::PrivateConversations { conversations },
        )
        .await;
    }

    /// Reaction to the users registry reporting new state.
    pub(crate) async fn on_users_change(&self) {
        self.push_users().await;
    }

    /// Reaction to the conversations registry reporting new state.
    pub(crate) async fn on_conversations_change(&self) {
        self.push_conversations().await;
        self.initialize_all_conversations().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{EventKind, RecordingSink};
    use parlor_core::Identity;
    use parlor_replica::Replica;
    use parlor_testkit::message;

    async fn manager(sink: Arc<RecordingSink>) -> ThreadManager<Replica> {
        let backend = Arc::new(Replica::in_memory(Identity::from_seed(&[2; 32])));
        let users = backend
            .open_registry::<UserRecord>("direct-messages-users")
            .await
            .unwrap();
        let conversations = backend
            .open_registry::<ConversationRecord>("message-threads")
            .await
            .unwrap();
        ThreadManager::new(
            backend,
            users,
            conversations,
            Arc::new(HandleTable::new()),
            sink,
        )
    }

    #[tokio::test]
    async fn test_add_user_skips_empty_address() {
        let threads = manager(Arc::new(RecordingSink::new())).await;
        threads.add_user("", "key").await.unwrap();
        threads.add_user("alice", "half").await.unwrap();

        let users = threads.users().all().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users["alice"].half_key, "half");
    }

    #[tokio::test]
    async fn test_initialize_conversation_idempotent() {
        let sink = Arc::new(RecordingSink::new());
        let threads = manager(Arc::clone(&sink)).await;

        let first = threads.initialize_conversation("alice-bob", "secret").await.unwrap().unwrap();
        let second = threads.initialize_conversation("alice-bob", "secret").await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(threads.conversations().all().await.len(), 1);
        assert_eq!(
            threads.conversations().get("alice-bob").await.unwrap().encrypted_secret,
            "secret"
        );
        assert!(first.listeners_attached());
        assert_eq!(sink.count(EventKind::DirectMessagesSnapshot), 2);
    }

    #[tokio::test]
    async fn test_send_direct_message_visible() {
        let threads = manager(Arc::new(RecordingSink::new())).await;
        let msg = message("alice-bob", 1, "hi");

        let id = threads.send_direct_message("alice-bob", msg.clone()).await.unwrap();
        assert!(id.is_some());
        assert_eq!(threads.messages("alice-bob", Limit::All).await, vec![msg]);
        assert!(threads.messages("nobody", Limit::All).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_pushes_snapshots() {
        let sink = Arc::new(RecordingSink::new());
        let threads = manager(Arc::clone(&sink)).await;
        threads.add_user("alice", "half").await.unwrap();

        threads.list_available_users().await;
        threads.list_private_conversations().await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            DeliveryEvent::AvailableUsers { users } => assert!(users.contains_key("alice")),
            other => panic!("unexpected event {:?}", other),
        }
        match &events[1] {
            DeliveryEvent::PrivateConversations { conversations } => {
                assert!(conversations.is_empty())
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_initialize_all_conversations_opens_missing() {
        let threads = manager(Arc::new(RecordingSink::new())).await;
        threads
            .conversations()
            .put(
                "carol-dave",
                ConversationRecord {
                    address: "carol-dave".into(),
                    encrypted_secret: "s".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(threads.initialize_all_conversations().await, 1);
        assert!(threads.handles().contains("carol-dave"));
        assert_eq!(threads.initialize_all_conversations().await, 0);
    }
}
