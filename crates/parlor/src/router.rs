//! Replication event router.
//!
//! One task per attached log turns its notifications into delivery events:
//! a local `Write` becomes a single-message push, `Replicated` and `Ready`
//! become a snapshot of the whole ordered log. Registries get one task each
//! that runs a reaction on `Replicated` and `Ready`.
//!
//! Sink failures are logged and the task keeps going.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use parlor_core::MessageEntry;
use parlor_replica::{ConvergentLog, Limit, LogEvent, Payload, RegistryEvent};

use crate::handles::Handle;
use crate::sink::{DeliveryEvent, DeliverySink};

/// Which family of delivery events a log feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Channel,
    Conversation,
}

impl Scope {
    fn snapshot(self, address: &str, messages: Vec<MessageEntry>) -> DeliveryEvent {
        match self {
            Scope::Channel => DeliveryEvent::ChannelMessages {
                channel: address.to_string(),
                messages,
            },
            Scope::Conversation => DeliveryEvent::DirectMessages {
                conversation: address.to_string(),
                messages,
            },
        }
    }

    fn single(self, address: &str, message: MessageEntry) -> DeliveryEvent {
        match self {
            Scope::Channel => DeliveryEvent::Message {
                channel: address.to_string(),
                message,
            },
            Scope::Conversation => DeliveryEvent::DirectMessage {
                conversation: address.to_string(),
                message,
            },
        }
    }
}

/// Emit an event, logging instead of failing.
pub(crate) async fn deliver(sink: &dyn DeliverySink, event: DeliveryEvent) {
    let kind = event.kind();
    if let Err(e) = sink.emit(event).await {
        warn!(kind = kind.as_str(), error = %e, "delivery failed");
    }
}

async fn push_log_snapshot(
    sink: &dyn DeliverySink,
    scope: Scope,
    address: &str,
    log: &dyn ConvergentLog<MessageEntry>,
) {
    let messages = log.all(Limit::All).await;
    deliver(sink, scope.snapshot(address, messages)).await;
}

/// Push the full ordered message set of a handle.
pub(crate) async fn push_snapshot(sink: &dyn DeliverySink, scope: Scope, handle: &Handle) {
    push_log_snapshot(sink, scope, handle.address(), handle.log().as_ref()).await;
}

/// Attach the router for `handle` unless one is already attached.
///
/// Returns true if this call attached it.
pub(crate) fn attach_log_router(
    handle: &Handle,
    scope: Scope,
    sink: Arc<dyn DeliverySink>,
) -> bool {
    if !handle.claim_listeners() {
        return false;
    }

    let rx = handle.log().subscribe();
    let task = tokio::spawn(route_log(
        handle.address().to_string(),
        Arc::clone(handle.log()),
        rx,
        scope,
        sink,
    ));
    handle.set_router(task);
    true
}

async fn route_log(
    address: String,
    log: Arc<dyn ConvergentLog<MessageEntry>>,
    mut rx: broadcast::Receiver<LogEvent<MessageEntry>>,
    scope: Scope,
    sink: Arc<dyn DeliverySink>,
) {
    loop {
        match rx.recv().await {
            Ok(LogEvent::Write { value, .. }) => {
                deliver(sink.as_ref(), scope.single(&address, value)).await;
            }
            Ok(LogEvent::Replicated { .. }) | Ok(LogEvent::Ready { .. }) => {
                push_log_snapshot(sink.as_ref(), scope, &address, log.as_ref()).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                // Missed events are covered by a fresh snapshot.
                warn!(address = %address, skipped, "router lagged");
                push_log_snapshot(sink.as_ref(), scope, &address, log.as_ref()).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(address = %address, "log router stopped");
}

/// Run `react` whenever the registry reports replicated or ready state.
pub(crate) fn spawn_registry_router<V, F, Fut>(
    name: String,
    mut rx: broadcast::Receiver<RegistryEvent<V>>,
    mut react: F,
) -> JoinHandle<()>
where
    V: Payload,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(LogEvent::Write { .. }) => {}
                Ok(LogEvent::Replicated { .. }) | Ok(LogEvent::Ready { .. }) => react().await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(registry = %name, skipped, "registry router lagged");
                    react().await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(registry = %name, "registry router stopped");
    })
}
