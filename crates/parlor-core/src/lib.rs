//! # parlor-core
//!
//! Pure primitives for parlor: signed entries, log addresses, deterministic
//! ordering and the chat records stored in logs and registries.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Entry`] - The unit of an append-only log, signed by its author
//! - [`EntryId`] - Content address of an entry (Blake3 hash)
//! - [`LogAddress`] - Peer-independent address of a log
//! - [`RegistryOp`] - A write to a key-value registry
//!
//! ## Ordering
//!
//! Every replica holding the same entry set iterates it in the same order.
//! See [`order`].

pub mod canonical;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod model;
pub mod op;
pub mod order;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, canonical_header_bytes, decode_entry};
pub use crypto::{Blake3Hash, Identity, PeerId, Signature};
pub use entry::{Entry, EntryBuilder, EntryHeader, MAX_HEADS};
pub use error::{CoreError, ValidationError};
pub use model::{
    ChannelInfo, ChannelKeys, ChannelRecord, ConversationRecord, MessageEntry, UserRecord,
};
pub use op::{decode_payload, encode_payload, resolve, RegistryOp};
pub use order::{frontier, linearize};
pub use types::{EntryId, LogAddress, LogKind};
pub use validation::{validate_entry, validate_entry_structure};
