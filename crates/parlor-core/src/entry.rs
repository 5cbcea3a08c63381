//! Entry: the unit of an append-only log.
//!
//! An entry is immutable once signed. It names the log it belongs to and the
//! heads of that log at the time it was appended, which links every log into
//! a hash DAG.

use bytes::Bytes;

use crate::canonical::{canonical_bytes, canonical_header_bytes};
use crate::crypto::{Blake3Hash, Identity, PeerId, Signature};
use crate::types::{EntryId, LogAddress};

/// The current entry schema version.
pub const ENTRY_VERSION: u8 = 0;

/// Maximum number of heads an entry may reference.
pub const MAX_HEADS: usize = 256;

/// The signed header of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// The log this entry belongs to.
    pub log: LogAddress,

    /// The peer that appended this entry.
    pub author: PeerId,

    /// Author-claimed wall clock (Unix milliseconds). Untrusted and not used
    /// for ordering.
    pub timestamp: i64,

    /// Heads of the log at append time, sorted and unique.
    pub heads: Vec<EntryId>,

    /// Blake3 hash of the payload bytes.
    pub payload_hash: Blake3Hash,
}

/// A complete entry: header + payload + signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub header: EntryHeader,

    /// Opaque payload; the typed layers encode their values here.
    pub payload: Bytes,

    /// Ed25519 signature over (canonical_header || payload).
    pub signature: Signature,
}

impl Entry {
    /// Compute the entry ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> EntryId {
        EntryId(Blake3Hash::hash(&canonical_bytes(self)).0)
    }

    pub fn log(&self) -> &LogAddress {
        &self.header.log
    }

    pub fn author(&self) -> &PeerId {
        &self.header.author
    }

    pub fn heads(&self) -> &[EntryId] {
        &self.header.heads
    }

    /// Whether this entry was appended to an empty log.
    pub fn is_root(&self) -> bool {
        self.header.heads.is_empty()
    }
}

/// Builder for creating entries.
pub struct EntryBuilder {
    log: LogAddress,
    timestamp: i64,
    heads: Vec<EntryId>,
    payload: Bytes,
}

impl EntryBuilder {
    pub fn new(log: LogAddress) -> Self {
        Self {
            log,
            timestamp: 0,
            heads: Vec::new(),
            payload: Bytes::new(),
        }
    }

    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the heads this entry follows. Sorted and deduplicated on build.
    pub fn heads(mut self, heads: impl IntoIterator<Item = EntryId>) -> Self {
        self.heads = heads.into_iter().collect();
        self
    }

    pub fn payload(mut self, p: impl Into<Bytes>) -> Self {
        self.payload = p.into();
        self
    }

    /// Build and sign the entry.
    pub fn sign(mut self, identity: &Identity) -> Entry {
        self.heads.sort();
        self.heads.dedup();

        let header = EntryHeader {
            version: ENTRY_VERSION,
            log: self.log,
            author: identity.peer_id(),
            timestamp: self.timestamp,
            heads: self.heads,
            payload_hash: Blake3Hash::hash(&self.payload),
        };

        let mut message = canonical_header_bytes(&header);
        message.extend_from_slice(&self.payload);
        let signature = identity.sign(&message);

        Entry {
            header,
            payload: self.payload,
            signature,
        }
    }
}
