//! Replica configuration.

use std::time::Duration;

/// Tuning for logs and registries opened by a [`crate::Replica`].
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    /// Upper bound on a single `load()` fetch from the transport.
    pub fetch_timeout: Duration,

    /// Verify signatures of entries received from other peers.
    pub verify_remote_entries: bool,

    /// Capacity of each log's event channel. Slow subscribers that fall
    /// further behind observe a lag and skip ahead.
    pub event_capacity: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(2000),
            verify_remote_entries: true,
            event_capacity: 256,
        }
    }
}
