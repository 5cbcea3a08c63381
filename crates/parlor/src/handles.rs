//! In-memory handle caches.
//!
//! A handle pairs an open log with its listener-attachment state. The table
//! hands out at most one handle per address: concurrent creators for the
//! same address share one initialization, and listeners attach at most once
//! per handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

use parlor_core::MessageEntry;
use parlor_replica::ConvergentLog;

/// A cached, open message log.
pub struct Handle {
    address: String,
    log: Arc<dyn ConvergentLog<MessageEntry>>,
    listeners_attached: AtomicBool,
    router: Mutex<Option<JoinHandle<()>>>,
}

/// Handle of a channel log.
pub type ChannelHandle = Handle;

/// Handle of a conversation log.
pub type ThreadHandle = Handle;

impl Handle {
    pub fn new(address: impl Into<String>, log: Arc<dyn ConvergentLog<MessageEntry>>) -> Self {
        Self {
            address: address.into(),
            log,
            listeners_attached: AtomicBool::new(false),
            router: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn log(&self) -> &Arc<dyn ConvergentLog<MessageEntry>> {
        &self.log
    }

    pub fn listeners_attached(&self) -> bool {
        self.listeners_attached.load(Ordering::Acquire)
    }

    /// Claim the right to attach listeners. Returns true exactly once.
    pub(crate) fn claim_listeners(&self) -> bool {
        self.listeners_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_router(&self, task: JoinHandle<()>) {
        *lock(&self.router) = Some(task);
    }

    /// Stop the router task, if any.
    pub(crate) fn detach(&self) {
        if let Some(task) = lock(&self.router).take() {
            task.abort();
        }
    }
}

type Slot = Arc<OnceCell<Arc<Handle>>>;

/// Address-keyed table of handles, shared by a lifecycle manager and the
/// facade.
#[derive(Default)]
pub struct HandleTable {
    slots: Mutex<HashMap<String, Slot>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `address`, created empty if needed. Initialize it with
    /// `OnceCell::get_or_try_init` so concurrent creators share one attempt.
    pub(crate) fn slot(&self, address: &str) -> Slot {
        lock(&self.slots)
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// The live handle for `address`, if one finished initializing.
    pub fn get(&self, address: &str) -> Option<Arc<Handle>> {
        lock(&self.slots)
            .get(address)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.get(address).is_some()
    }

    /// Addresses with a live handle, sorted.
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = lock(&self.slots)
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(address, _)| address.clone())
            .collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.addresses().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every handle, stopping their routers.
    pub fn clear(&self) {
        let slots: Vec<Slot> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            if let Some(handle) = slot.get() {
                handle.detach();
            }
        }
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
