//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests.

use std::sync::Arc;
use std::time::Duration;

use parlor_core::{ChannelInfo, ChannelKeys, Identity, MessageEntry};
use parlor_replica::{MemoryHub, Replica, ReplicaConfig};
use parlor_store::MemoryStore;

/// Deterministic identity number `n`.
pub fn identity(n: u8) -> Identity {
    let mut seed = [0u8; 32];
    seed[0] = n;
    seed[31] = 0x5a;
    Identity::from_seed(&seed)
}

/// A plain text message for `channel` with counter `counter`.
pub fn message(channel: &str, counter: i64, text: &str) -> MessageEntry {
    MessageEntry {
        id: format!("{}-{}", channel, counter),
        kind: 1,
        type_indicator: 0,
        message: text.to_string(),
        created_at: 1_600_000_000 + counter,
        counter,
        channel_id: channel.to_string(),
        signature: String::new(),
    }
}

/// Metadata for a channel named after its address, without keys.
pub fn channel_info(address: &str) -> ChannelInfo {
    ChannelInfo {
        description: format!("#{}", address),
        owner: "testkit".into(),
        timestamp: 1_600_000_000,
        ..ChannelInfo::for_address(address)
    }
}

/// Metadata for a channel that carries keys and so is publicly listed.
pub fn keyed_channel_info(address: &str) -> ChannelInfo {
    ChannelInfo {
        keys: Some(ChannelKeys {
            ivk: Some(format!("ivk-{}", address)),
            sk: None,
        }),
        ..channel_info(address)
    }
}

/// Replicas connected through one [`MemoryHub`].
pub struct TestNetwork {
    pub hub: Arc<MemoryHub>,
    pub config: ReplicaConfig,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            hub: MemoryHub::new(),
            config: ReplicaConfig {
                fetch_timeout: Duration::from_millis(200),
                ..ReplicaConfig::default()
            },
        }
    }

    /// A network whose fetches give up after `timeout`.
    pub fn with_fetch_timeout(timeout: Duration) -> Self {
        let mut network = Self::new();
        network.config.fetch_timeout = timeout;
        network
    }

    /// A fresh in-memory replica for identity `n`.
    pub fn peer(&self, n: u8) -> Arc<Replica> {
        let identity = identity(n);
        let transport = self.hub.connect(identity.peer_id());
        Arc::new(Replica::new(
            identity,
            Arc::new(MemoryStore::new()),
            Arc::new(transport),
            self.config.clone(),
        ))
    }

    /// `count` replicas numbered from 1.
    pub fn peers(&self, count: u8) -> Vec<Arc<Replica>> {
        (1..=count).map(|n| self.peer(n)).collect()
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::LogKind;
    use parlor_replica::{Backend, ConvergentLog, Limit};

    #[test]
    fn test_identities_distinct() {
        assert_eq!(identity(1).peer_id(), identity(1).peer_id());
        assert_ne!(identity(1).peer_id(), identity(2).peer_id());
    }

    #[test]
    fn test_keyed_channel_info() {
        let info = keyed_channel_info("general");
        assert_eq!(info.name, "general");
        assert!(info.keys.is_some());
        assert!(channel_info("general").keys.is_none());
    }

    #[tokio::test]
    async fn test_network_replicates() {
        let network = TestNetwork::new();
        let peers = network.peers(2);

        let a = peers[0]
            .open_log::<MessageEntry>(LogKind::Channel, "general")
            .await
            .unwrap();
        let b = peers[1]
            .open_log::<MessageEntry>(LogKind::Channel, "general")
            .await
            .unwrap();

        a.append(message("general", 1, "hi")).await.unwrap();
        let report = b.load().await.unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(b.all(Limit::All).await, vec![message("general", 1, "hi")]);
    }
}
