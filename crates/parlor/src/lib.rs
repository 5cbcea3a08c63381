//! # parlor
//!
//! A peer-replicated store for chat channels and direct-message threads.
//!
//! ## Overview
//!
//! Every channel and every conversation is an append-only log replicated
//! between peers. Three registries track what exists:
//!
//! - `public-channels`: channel address to [`ChannelRecord`]
//! - `direct-messages-users`: user address to [`UserRecord`]
//! - `message-threads`: conversation address to [`ConversationRecord`]
//!
//! The store opens each log at most once per process, attaches one router
//! per log, and turns local writes and remote replication into
//! [`DeliveryEvent`]s pushed to a [`DeliverySink`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parlor::{ChatStore, ChannelSink, ParlorConfig};
//! use parlor::core::Identity;
//! use parlor::replica::Offline;
//!
//! async fn example() -> parlor::Result<()> {
//!     let (sink, mut events) = ChannelSink::unbounded();
//!     let chat = ChatStore::open(
//!         ParlorConfig::new("parlor-data"),
//!         Identity::generate(),
//!         Arc::new(Offline),
//!         Arc::new(sink),
//!     )
//!     .await?;
//!
//!     chat.subscribe_for_channel("general", None).await?;
//!     let first = events.recv().await;
//!     println!("{:?}", first);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `parlor::core` - entries, addresses, chat records
//! - `parlor::store` - persistence
//! - `parlor::replica` - replicated logs, registries, transports

pub mod channels;
pub mod chat;
pub mod config;
pub mod error;
pub mod handles;
mod router;
pub mod seed;
pub mod sink;
pub mod threads;

pub use parlor_core as core;
pub use parlor_replica as replica;
pub use parlor_store as store;

pub use channels::ChannelManager;
pub use chat::{ChatStore, CHANNELS_REGISTRY, CONVERSATIONS_REGISTRY, USERS_REGISTRY};
pub use config::ParlorConfig;
pub use error::{ParlorError, Result};
pub use handles::{ChannelHandle, Handle, HandleTable, ThreadHandle};
pub use seed::SeedManifest;
pub use sink::{
    ChannelSink, DeliveryEvent, DeliverySink, EventKind, NullSink, RecordingSink, SinkError,
};
pub use threads::ThreadManager;

pub use parlor_core::{
    ChannelInfo, ChannelKeys, ChannelRecord, ConversationRecord, EntryId, MessageEntry, UserRecord,
};
pub use parlor_replica::Limit;
