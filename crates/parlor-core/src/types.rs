//! Strong identifiers for entries and logs.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte entry identifier, computed as Blake3(canonical_bytes(entry)).
///
/// This is the content address of an entry. Ordering is plain byte order and
/// is what breaks ties between concurrent entries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub [u8; 32]);

impl EntryId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 32]> for EntryId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for EntryId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// What a log holds. Part of the address derivation, so a channel and a
/// conversation with the same name never share a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogKind {
    /// Messages of a public channel.
    Channel = 1,
    /// Messages of a private conversation.
    Conversation = 2,
    /// Operations of a key-value registry.
    Registry = 3,
}

impl LogKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Channel),
            2 => Some(Self::Conversation),
            3 => Some(Self::Registry),
            _ => None,
        }
    }

    /// Name prefix used when deriving addresses.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Channel => "parlor.channels",
            Self::Conversation => "parlor.direct-messages",
            Self::Registry => "parlor.registry",
        }
    }
}

/// A 32-byte log address.
///
/// Derived from Blake3(kind prefix || name) and independent of the peer that
/// opens it: every peer opening channel `general` lands on the same log.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogAddress(pub [u8; 32]);

impl LogAddress {
    /// Derive the address of a log from its kind and name.
    pub fn derive(kind: LogKind, name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"parlor-log-v0:");
        hasher.update(kind.prefix().as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Locator string stored in registry records, e.g. `/parlor/3f9a…`.
    pub fn locator(&self) -> String {
        format!("/parlor/{}", self.to_hex())
    }
}

impl fmt::Debug for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogAddress({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
