//! Channel lifecycle: create-on-demand, subscription and sending.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use parlor_core::{ChannelInfo, ChannelRecord, EntryId, LogKind, MessageEntry};
use parlor_replica::{Backend, ConvergentRegistry, Limit};

use crate::error::Result;
use crate::handles::{ChannelHandle, Handle, HandleTable};
use crate::router::{attach_log_router, deliver, push_snapshot, Scope};
use crate::sink::{DeliveryEvent, DeliverySink};

/// Manages channel logs and the channel registry.
pub struct ChannelManager<B: Backend> {
    backend: Arc<B>,
    registry: Arc<dyn ConvergentRegistry<ChannelRecord>>,
    handles: Arc<HandleTable>,
    sink: Arc<dyn DeliverySink>,
}

impl<B: Backend> ChannelManager<B> {
    pub fn new(
        backend: Arc<B>,
        registry: Arc<dyn ConvergentRegistry<ChannelRecord>>,
        handles: Arc<HandleTable>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            backend,
            registry,
            handles,
            sink,
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConvergentRegistry<ChannelRecord>> {
        &self.registry
    }

    pub fn handles(&self) -> &Arc<HandleTable> {
        &self.handles
    }

    /// Open the channel log for `address`, recording it in the registry if
    /// no record exists yet.
    ///
    /// Returns `None` for an empty address. Concurrent calls for one address
    /// share a single creation.
    pub async fn create_channel(
        &self,
        address: &str,
        metadata: Option<ChannelInfo>,
    ) -> Result<Option<Arc<ChannelHandle>>> {
        if address.is_empty() {
            warn!("no channel address, can't create channel");
            return Ok(None);
        }

        let slot = self.handles.slot(address);
        let handle = slot
            .get_or_try_init(|| self.open_channel(address, metadata))
            .await?;
        Ok(Some(Arc::clone(handle)))
    }

    async fn open_channel(
        &self,
        address: &str,
        metadata: Option<ChannelInfo>,
    ) -> Result<Arc<ChannelHandle>> {
        let log = self
            .backend
            .open_log::<MessageEntry>(LogKind::Channel, address)
            .await?;

        if self.registry.get(address).await.is_none() {
            let mut metadata = metadata.unwrap_or_else(|| ChannelInfo::for_address(address));
            metadata.address = address.to_string();
            let record = ChannelRecord::new(metadata, log.address().locator());
            self.registry.put(address, record).await?;
            info!(channel = address, "created channel");
        }

        if let Err(e) = log.load().await {
            warn!(channel = address, error = %e, "channel load failed");
        }
        Ok(Arc::new(Handle::new(address, log)))
    }

    /// Create the channel if needed and attach its router once. Pushes a
    /// snapshot only when this call attached the router.
    async fn ensure_subscribed(
        &self,
        address: &str,
        metadata: Option<ChannelInfo>,
    ) -> Result<Option<(Arc<ChannelHandle>, bool)>> {
        let handle = match self.create_channel(address, metadata).await? {
            Some(handle) => handle,
            None => {
                warn!(channel = address, "can't subscribe to channel");
                return Ok(None);
            }
        };

        let attached = attach_log_router(&handle, Scope::Channel, Arc::clone(&self.sink));
        if attached {
            info!(channel = address, "subscribed to channel");
        }
        Ok(Some((handle, attached)))
    }

    /// Subscribe to a channel and push its current messages.
    pub async fn subscribe(
        &self,
        address: &str,
        metadata: Option<ChannelInfo>,
    ) -> Result<Option<Arc<ChannelHandle>>> {
        match self.ensure_subscribed(address, metadata).await? {
            Some((handle, _)) => {
                push_snapshot(self.sink.as_ref(), Scope::Channel, &handle).await;
                Ok(Some(handle))
            }
            None => Ok(None),
        }
    }

    /// Append a message, subscribing first if needed.
    pub async fn send_message(
        &self,
        address: &str,
        message: MessageEntry,
    ) -> Result<Option<EntryId>> {
        let handle = match self.ensure_subscribed(address, None).await? {
            Some((handle, attached)) => {
                if attached {
                    push_snapshot(self.sink.as_ref(), Scope::Channel, &handle).await;
                }
                handle
            }
            None => return Ok(None),
        };
        Ok(Some(handle.log().append(message).await?))
    }

    /// Messages of a channel with a live handle, in log order. Unknown
    /// channels yield nothing.
    pub async fn messages(&self, address: &str, limit: Limit) -> Vec<MessageEntry> {
        match self.handles.get(address) {
            Some(handle) => handle.log().all(limit).await,
            None => Vec::new(),
        }
    }

    /// Push a channel's messages again. Does nothing for an unknown channel.
    pub async fn load_all_channel_messages(&self, address: &str) {
        if let Some(handle) = self.handles.get(address) {
            push_snapshot(self.sink.as_ref(), Scope::Channel, &handle).await;
        }
    }

    /// Open a handle for every registered channel that has none.
    ///
    /// Returns how many handles were created.
    pub async fn initialize_all_known_channels(&self) -> usize {
        let mut created = 0;
        for (address, record) in self.registry.all().await {
            if self.handles.contains(&address) {
                continue;
            }
            match self.create_channel(&address, Some(record.info())).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {}
                Err(e) => warn!(channel = %address, error = %e, "failed to open known channel"),
            }
        }
        debug!(created, "initialized known channels");
        created
    }

    /// Channels that carry keys, keyed by channel name.
    pub async fn public_channels(&self) -> BTreeMap<String, ChannelInfo> {
        self.registry
            .all()
            .await
            .into_values()
            .filter(ChannelRecord::has_keys)
            .map(|record| (record.name.clone(), record.info()))
            .collect()
    }

    /// Push the public channel listing.
    pub async fn update_channels(&self) {
        let channels = self.public_channels().await;
        deliver(self.sink.as_ref(), DeliveryEvent::PublicChannels { channels }).await;
    }

    /// Reaction to the channel registry reporting new state.
    pub(crate) async fn on_registry_change(&self) {
        self.initialize_all_known_channels().await;
        self.update_channels().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::Identity;
    use parlor_replica::Replica;
    use crate::sink::RecordingSink;
    use parlor_testkit::message;

    async fn manager(sink: Arc<RecordingSink>) -> ChannelManager<Replica> {
        let backend = Arc::new(Replica::in_memory(Identity::from_seed(&[1; 32])));
        let registry = backend
            .open_registry::<ChannelRecord>("public-channels")
            .await
            .unwrap();
        ChannelManager::new(backend, registry, Arc::new(HandleTable::new()), sink)
    }

    #[tokio::test]
    async fn test_empty_address_yields_none() {
        let channels = manager(Arc::new(RecordingSink::new())).await;
        assert!(channels.create_channel("", None).await.unwrap().is_none());
        assert!(channels.subscribe("", None).await.unwrap().is_none());
        assert!(channels.send_message("", message("general", 1, "x")).await.unwrap().is_none());
        assert!(channels.registry().all().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_records_locator() {
        let channels = manager(Arc::new(RecordingSink::new())).await;
        let handle = channels.create_channel("general", None).await.unwrap().unwrap();

        let record = channels.registry().get("general").await.unwrap();
        assert_eq!(record.address, "general");
        assert_eq!(record.log_address, handle.log().address().locator());
    }

    #[tokio::test]
    async fn test_existing_record_not_overwritten() {
        let channels = manager(Arc::new(RecordingSink::new())).await;
        let mut original = ChannelInfo::for_address("general");
        original.description = "first".into();
        channels
            .registry()
            .put("general", ChannelRecord::new(original, "/parlor/x".into()))
            .await
            .unwrap();

        let mut other = ChannelInfo::for_address("general");
        other.description = "second".into();
        channels.create_channel("general", Some(other)).await.unwrap();

        let record = channels.registry().get("general").await.unwrap();
        assert_eq!(record.description, "first");
    }

    #[tokio::test]
    async fn test_public_channels_only_keyed() {
        let channels = manager(Arc::new(RecordingSink::new())).await;
        let mut keyed = ChannelInfo::for_address("addr-general");
        keyed.name = "general".into();
        keyed.keys = Some(parlor_core::ChannelKeys {
            ivk: Some("ivk".into()),
            sk: None,
        });
        channels.create_channel("addr-general", Some(keyed)).await.unwrap();
        channels.create_channel("addr-random", None).await.unwrap();

        let public = channels.public_channels().await;
        assert_eq!(public.len(), 1);
        assert_eq!(public["general"].address, "addr-general");
    }

    #[tokio::test]
    async fn test_load_all_unknown_channel_pushes_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let channels = manager(Arc::clone(&sink)).await;
        channels.load_all_channel_messages("nowhere").await;
        assert!(sink.events().is_empty());
    }
}
