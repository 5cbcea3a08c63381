//! Delivery sink: where normalized push events go.
//!
//! The sink is whatever pushes payloads to connected clients. The store
//! only ever calls [`DeliverySink::emit`]; failures are logged by the caller
//! and never undo store state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use parlor_core::{ChannelInfo, ConversationRecord, MessageEntry, UserRecord};

/// The kind of a delivery event, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChannelMessagesSnapshot,
    DirectMessagesSnapshot,
    SingleMessage,
    SingleDirectMessage,
    AvailableUsersSnapshot,
    PrivateConversationsSnapshot,
    PublicChannelsSnapshot,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ChannelMessagesSnapshot => "channel-messages-snapshot",
            EventKind::DirectMessagesSnapshot => "direct-messages-snapshot",
            EventKind::SingleMessage => "single-message",
            EventKind::SingleDirectMessage => "single-direct-message",
            EventKind::AvailableUsersSnapshot => "available-users-snapshot",
            EventKind::PrivateConversationsSnapshot => "private-conversations-snapshot",
            EventKind::PublicChannelsSnapshot => "public-channels-snapshot",
        }
    }
}

/// A push event with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload")]
pub enum DeliveryEvent {
    /// Every message of a channel, in log order.
    #[serde(rename = "channel-messages-snapshot")]
    ChannelMessages {
        channel: String,
        messages: Vec<MessageEntry>,
    },
    /// Every message of a conversation, in log order.
    #[serde(rename = "direct-messages-snapshot")]
    DirectMessages {
        conversation: String,
        messages: Vec<MessageEntry>,
    },
    /// One message appended locally to a channel.
    #[serde(rename = "single-message")]
    Message {
        channel: String,
        message: MessageEntry,
    },
    /// One message appended locally to a conversation.
    #[serde(rename = "single-direct-message")]
    DirectMessage {
        conversation: String,
        message: MessageEntry,
    },
    #[serde(rename = "available-users-snapshot")]
    AvailableUsers {
        users: BTreeMap<String, UserRecord>,
    },
    #[serde(rename = "private-conversations-snapshot")]
    PrivateConversations {
        conversations: BTreeMap<String, ConversationRecord>,
    },
    /// Keyed channels, by channel name.
    #[serde(rename = "public-channels-snapshot")]
    PublicChannels {
        channels: BTreeMap<String, ChannelInfo>,
    },
}

impl DeliveryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DeliveryEvent::ChannelMessages { .. } => EventKind::ChannelMessagesSnapshot,
            DeliveryEvent::DirectMessages { .. } => EventKind::DirectMessagesSnapshot,
            DeliveryEvent::Message { .. } => EventKind::SingleMessage,
            DeliveryEvent::DirectMessage { .. } => EventKind::SingleDirectMessage,
            DeliveryEvent::AvailableUsers { .. } => EventKind::AvailableUsersSnapshot,
            DeliveryEvent::PrivateConversations { .. } => EventKind::PrivateConversationsSnapshot,
            DeliveryEvent::PublicChannels { .. } => EventKind::PublicChannelsSnapshot,
        }
    }
}

/// A delivery failure.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct SinkError(pub String);

/// Consumer of push events.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn emit(&self, event: DeliveryEvent) -> Result<(), SinkError>;
}

/// A sink forwarding events into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<DeliveryEvent>,
}

impl ChannelSink {
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<DeliveryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DeliverySink for ChannelSink {
    async fn emit(&self, event: DeliveryEvent) -> Result<(), SinkError> {
        self.tx
            .send(event)
            .map_err(|e| SinkError(format!("receiver dropped: {}", e.0.kind().as_str())))
    }
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl DeliverySink for NullSink {
    async fn emit(&self, _event: DeliveryEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that keeps every event it receives. Used by tests and tools that
/// inspect what a store pushed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DeliveryEvent>>,
    notify: Notify,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `emit` fail (after recording nothing).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<DeliveryEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }

    /// Wait until at least `n` events of `kind` were recorded.
    ///
    /// Returns false if `timeout` passes first.
    pub async fn wait_for(&self, kind: EventKind, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.count(kind) >= n {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.count(kind) >= n;
            }
        }
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn emit(&self, event: DeliveryEvent) -> Result<(), SinkError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(SinkError(format!("refused {}", event.kind().as_str())));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = DeliveryEvent::ChannelMessages {
            channel: "general".into(),
            messages: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], event.kind().as_str());
        assert_eq!(json["payload"]["channel"], "general");
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (sink, rx) = ChannelSink::unbounded();
        drop(rx);
        let result = sink
            .emit(DeliveryEvent::AvailableUsers {
                users: BTreeMap::new(),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_recording_sink_wait_for() {
        let sink = std::sync::Arc::new(RecordingSink::new());
        let emitter = std::sync::Arc::clone(&sink);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            emitter
                .emit(DeliveryEvent::PublicChannels {
                    channels: BTreeMap::new(),
                })
                .await
                .unwrap();
        });

        assert!(
            sink.wait_for(EventKind::PublicChannelsSnapshot, 1, Duration::from_secs(1))
                .await
        );
        assert!(
            !sink
                .wait_for(EventKind::SingleMessage, 1, Duration::from_millis(20))
                .await
        );

        sink.set_failing(true);
        assert!(sink.emit(DeliveryEvent::AvailableUsers { users: BTreeMap::new() }).await.is_err());
        assert_eq!(sink.take().len(), 1);
        assert!(sink.events().is_empty());
    }
}
