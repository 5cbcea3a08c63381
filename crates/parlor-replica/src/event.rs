//! Notifications emitted by logs and registries.

use parlor_core::{EntryId, LogAddress, RegistryOp};

/// A change notification from a log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent<V> {
    /// A local append. Never emitted for merged entries.
    Write {
        address: LogAddress,
        id: EntryId,
        value: V,
    },
    /// A merge added `added` entries from another replica.
    Replicated { address: LogAddress, added: usize },
    /// The first successful load finished.
    Ready { address: LogAddress },
}

impl<V> LogEvent<V> {
    pub fn address(&self) -> &LogAddress {
        match self {
            LogEvent::Write { address, .. }
            | LogEvent::Replicated { address, .. }
            | LogEvent::Ready { address } => address,
        }
    }
}

/// Registries are logs of operations.
pub type RegistryEvent<V> = LogEvent<RegistryOp<V>>;
