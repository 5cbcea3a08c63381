//! # parlor-replica
//!
//! Replicated logs and registries for parlor.
//!
//! ## Overview
//!
//! Every channel and conversation is an [`EntryLog`]: an append-only,
//! content-addressed set of signed entries, each linked to the log's heads
//! at append time. Registries are logs of [`parlor_core::RegistryOp`]s
//! resolved by replay. Replicas converge by exchanging entries; merge is a
//! set union, so the order of exchanges never matters.
//!
//! ## Events
//!
//! Each log publishes [`LogEvent`]s on a `tokio::sync::broadcast` channel:
//! `Write` for local appends, `Replicated` when a merge added entries, and
//! `Ready` once the first load finished.
//!
//! ## Backends
//!
//! Lifecycle code is written against [`Backend`], [`ConvergentLog`] and
//! [`ConvergentRegistry`]. [`Replica`] is the implementation shipped here.

pub mod config;
pub mod convergence;
pub mod error;
pub mod event;
pub mod log;
pub mod registry;
pub mod replica;
pub mod traits;
pub mod transport;

pub use config::ReplicaConfig;
pub use convergence::{exchange, verify_convergence, ConvergenceResult};
pub use error::{ReplicaError, Result};
pub use event::{LogEvent, RegistryEvent};
pub use log::{EntryLog, LogContext};
pub use registry::Registry;
pub use replica::Replica;
pub use traits::{
    Backend, ConvergentLog, ConvergentRegistry, Limit, Mergeable, MergeReport, Payload,
};
pub use transport::memory::{HubTransport, MemoryHub};
pub use transport::{Offline, ReplicationTransport};
