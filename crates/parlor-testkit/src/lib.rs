//! # parlor-testkit
//!
//! Testing utilities for parlor.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic identities, chat messages, channel metadata
//! - **Networks**: several replicas sharing one in-memory replication hub
//! - **Generators**: proptest strategies for messages and entries
//!
//! ## Test Networks
//!
//! ```rust
//! use parlor_replica::Backend;
//! use parlor_testkit::fixtures::TestNetwork;
//!
//! let network = TestNetwork::new();
//! let alice = network.peer(1);
//! let bob = network.peer(2);
//! assert_ne!(alice.peer_id(), bob.peer_id());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use parlor_testkit::generators::message_entry;
//!
//! proptest! {
//!     #[test]
//!     fn message_survives_payload_encoding(msg in message_entry()) {
//!         let bytes = parlor_core::encode_payload(&msg).unwrap();
//!         prop_assert_eq!(parlor_core::decode_payload::<parlor_core::MessageEntry>(&bytes).unwrap(), msg);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{channel_info, identity, keyed_channel_info, message, TestNetwork};
