//! The replicated entry log.
//!
//! An [`EntryLog`] holds the full entry set of one log in memory, writes
//! every accepted entry through to the peer's [`EntryStore`], and keeps the
//! deterministic total order up to date after each change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use parlor_core::{
    canonical_bytes, decode_payload, encode_payload, linearize, validate_entry,
    validate_entry_structure, Blake3Hash, Entry, EntryBuilder, EntryId, Identity, LogAddress,
    LogKind, ValidationError, MAX_HEADS,
};
use parlor_store::{EntryStore, StoreError};

use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, Result};
use crate::event::LogEvent;
use crate::transport::ReplicationTransport;
use crate::traits::{ConvergentLog, Limit, Mergeable, MergeReport, Payload};

/// What every log opened by one peer shares.
#[derive(Clone)]
pub struct LogContext {
    pub identity: Arc<Identity>,
    pub store: Arc<dyn EntryStore>,
    pub transport: Arc<dyn ReplicationTransport>,
    pub config: ReplicaConfig,
}

struct LogState<V> {
    entries: HashMap<EntryId, Entry>,
    values: HashMap<EntryId, V>,
    graph: HashMap<EntryId, Vec<EntryId>>,
    order: Vec<EntryId>,
    /// Entries no held entry references.
    heads: BTreeSet<EntryId>,
    /// Every id some held entry references, held or not.
    referenced: HashSet<EntryId>,
}

impl<V> LogState<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            values: HashMap::new(),
            graph: HashMap::new(),
            order: Vec::new(),
            heads: BTreeSet::new(),
            referenced: HashSet::new(),
        }
    }

    fn insert(&mut self, id: EntryId, entry: Entry, value: V) {
        for head in entry.heads() {
            self.referenced.insert(*head);
            self.heads.remove(head);
        }
        if !self.referenced.contains(&id) {
            self.heads.insert(id);
        }
        self.graph.insert(id, entry.heads().to_vec());
        self.entries.insert(id, entry);
        self.values.insert(id, value);
    }

    fn reorder(&mut self) {
        self.order = linearize(&self.graph);
    }
}

/// Outcome of ingesting remote entries, before any event is sent.
pub(crate) struct Ingested {
    pub report: MergeReport,
    pub failure: Option<StoreError>,
}

impl Ingested {
    pub fn into_result(self) -> Result<MergeReport> {
        match self.failure {
            Some(e) => Err(e.into()),
            None => Ok(self.report),
        }
    }
}

/// An append-only, hash-linked log of `V` values.
pub struct EntryLog<V> {
    address: LogAddress,
    kind: LogKind,
    name: String,
    ctx: LogContext,
    state: Mutex<LogState<V>>,
    events: broadcast::Sender<LogEvent<V>>,
    ready: AtomicBool,
}

impl<V: Payload> EntryLog<V> {
    /// Open the log `(kind, name)`, restoring whatever the store holds.
    pub async fn open(kind: LogKind, name: &str, ctx: LogContext) -> Result<Self> {
        let address = LogAddress::derive(kind, name);
        ctx.store.register_log(&address, kind, name).await?;

        let mut state = LogState::new();
        for entry in ctx.store.entries_for_log(&address).await? {
            let id = entry.compute_id();
            if let Err(e) = validate_entry_structure(&entry) {
                warn!(log = %address, entry = %id, error = %e, "skipping invalid stored entry");
                continue;
            }
            match decode_payload::<V>(&entry.payload) {
                Ok(value) => state.insert(id, entry, value),
                Err(e) => {
                    warn!(log = %address, entry = %id, error = %e, "skipping undecodable stored entry")
                }
            }
        }
        state.reorder();
        debug!(log = %address, kind = ?kind, name, entries = state.order.len(), "opened log");

        let (events, _) = broadcast::channel(ctx.config.event_capacity.max(1));
        Ok(Self {
            address,
            kind,
            name: name.to_string(),
            ctx,
            state: Mutex::new(state),
            events,
            ready: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> LogAddress {
        self.address
    }

    pub fn kind(&self) -> LogKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a value on top of the current heads.
    ///
    /// At most [`MAX_HEADS`] heads are referenced, smallest ids first. The
    /// rest stay heads and are picked up by later appends.
    pub async fn append(&self, value: V) -> Result<EntryId> {
        let payload = encode_payload(&value)?;

        let mut state = self.state.lock().await;
        let heads: Vec<EntryId> = state.heads.iter().take(MAX_HEADS).copied().collect();
        let covers_all = heads.len() == state.heads.len();
        let entry = EntryBuilder::new(self.address)
            .timestamp(now_millis())
            .heads(heads)
            .payload(payload)
            .sign(&self.ctx.identity);
        validate_entry_structure(&entry)?;
        let id = entry.compute_id();

        self.ctx
            .store
            .insert_entry(&entry, &canonical_bytes(&entry))
            .await?;
        state.insert(id, entry.clone(), value.clone());
        // Following every head puts the new entry after everything held.
        if covers_all {
            state.order.push(id);
        } else {
            state.reorder();
        }
        drop(state);

        if let Err(e) = self.ctx.transport.announce(&entry).await {
            warn!(log = %self.address, entry = %id, error = %e, "announce failed");
        }

        let _ = self.events.send(LogEvent::Write {
            address: self.address,
            id,
            value,
        });
        Ok(id)
    }

    /// Merge entries received from another replica.
    ///
    /// Invalid entries are counted and skipped. A store failure stops the
    /// merge; entries accepted before it stay visible.
    pub async fn merge(&self, entries: Vec<Entry>) -> Result<MergeReport> {
        let ingested = self.ingest(entries).await;
        if ingested.report.changed() {
            self.notify_replicated(ingested.report.added);
        }
        ingested.into_result()
    }

    /// Validate and store remote entries without sending any event.
    pub(crate) async fn ingest(&self, entries: Vec<Entry>) -> Ingested {
        let mut report = MergeReport::default();
        let mut failure = None;

        let mut state = self.state.lock().await;
        for entry in entries {
            let id = entry.compute_id();
            if state.entries.contains_key(&id) {
                report.duplicates += 1;
                continue;
            }

            if let Err(e) = self.check_remote(&entry) {
                warn!(log = %self.address, entry = %id, error = %e, "rejected remote entry");
                report.rejected += 1;
                continue;
            }

            let value = match decode_payload::<V>(&entry.payload) {
                Ok(value) => value,
                Err(e) => {
                    warn!(log = %self.address, entry = %id, error = %e, "rejected undecodable entry");
                    report.rejected += 1;
                    continue;
                }
            };

            if let Err(e) = self
                .ctx
                .store
                .insert_entry(&entry, &canonical_bytes(&entry))
                .await
            {
                failure = Some(e);
                break;
            }
            state.insert(id, entry, value);
            report.added += 1;
        }
        if report.changed() {
            state.reorder();
            debug!(log = %self.address, added = report.added, "merged remote entries");
        }

        Ingested { report, failure }
    }

    pub(crate) fn notify_replicated(&self, added: usize) {
        let _ = self.events.send(LogEvent::Replicated {
            address: self.address,
            added,
        });
    }

    fn check_remote(&self, entry: &Entry) -> std::result::Result<(), ValidationError> {
        if self.ctx.config.verify_remote_entries {
            return validate_entry(entry, &self.address);
        }
        if entry.header.log != self.address {
            return Err(ValidationError::WrongLog {
                expected: self.address,
                got: entry.header.log,
            });
        }
        validate_entry_structure(entry)
    }

    /// Fetch from the transport and merge, bounded by the fetch timeout.
    ///
    /// The first successful load emits [`LogEvent::Ready`].
    pub async fn load(&self) -> Result<MergeReport> {
        let fetched = self.fetch().await?;
        let report = self.merge(fetched).await?;
        self.mark_ready();
        Ok(report)
    }

    pub(crate) async fn fetch(&self) -> Result<Vec<Entry>> {
        let timeout = self.ctx.config.fetch_timeout;
        match tokio::time::timeout(timeout, self.ctx.transport.fetch(&self.address)).await {
            Ok(result) => result,
            Err(_) => Err(ReplicaError::Timeout(format!(
                "fetch of {} exceeded {:?}",
                self.address, timeout
            ))),
        }
    }

    pub(crate) fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            debug!(log = %self.address, "log ready");
            let _ = self.events.send(LogEvent::Ready {
                address: self.address,
            });
        }
    }

    /// Values in total order.
    pub async fn all(&self, limit: Limit) -> Vec<V> {
        let state = self.state.lock().await;
        state.order[limit.window(state.order.len())]
            .iter()
            .filter_map(|id| state.values.get(id).cloned())
            .collect()
    }

    /// Fold over `(value, entry)` pairs in total order without cloning them.
    pub async fn fold<T>(&self, init: T, mut f: impl FnMut(T, &V, &Entry) -> T) -> T {
        let state = self.state.lock().await;
        let mut acc = init;
        for id in &state.order {
            if let (Some(value), Some(entry)) = (state.values.get(id), state.entries.get(id)) {
                acc = f(acc, value, entry);
            }
        }
        acc
    }

    /// Entries in total order.
    pub async fn entries(&self, limit: Limit) -> Vec<Entry> {
        let state = self.state.lock().await;
        state.order[limit.window(state.order.len())]
            .iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    /// Entry ids in total order.
    pub async fn ids(&self) -> Vec<EntryId> {
        self.state.lock().await.order.clone()
    }

    /// Entries nothing else in the log references yet, sorted.
    pub async fn heads(&self) -> Vec<EntryId> {
        self.state.lock().await.heads.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn state_hash(&self) -> Blake3Hash {
        let state = self.state.lock().await;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"parlor-state-v0:");
        hasher.update(self.address.as_bytes());
        for id in &state.order {
            hasher.update(id.as_bytes());
        }
        Blake3Hash(*hasher.finalize().as_bytes())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent<V>> {
        self.events.subscribe()
    }
}

#[async_trait]
impl<V: Payload> Mergeable for EntryLog<V> {
    fn address(&self) -> LogAddress {
        self.address
    }

    async fn export(&self) -> Vec<Entry> {
        self.entries(Limit::All).await
    }

    async fn merge(&self, entries: Vec<Entry>) -> Result<MergeReport> {
        EntryLog::merge(self, entries).await
    }

    async fn state_hash(&self) -> Blake3Hash {
        EntryLog::state_hash(self).await
    }
}

#[async_trait]
impl<V: Payload> ConvergentLog<V> for EntryLog<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn append(&self, value: V) -> Result<EntryId> {
        EntryLog::append(self, value).await
    }

    async fn all(&self, limit: Limit) -> Vec<V> {
        EntryLog::all(self, limit).await
    }

    async fn len(&self) -> usize {
        EntryLog::len(self).await
    }

    async fn load(&self) -> Result<MergeReport> {
        EntryLog::load(self).await
    }

    fn subscribe(&self) -> broadcast::Receiver<LogEvent<V>> {
        EntryLog::subscribe(self)
    }
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryHub;
    use crate::transport::Offline;
    use parlor_store::{MemoryStore, SqliteStore};
    use std::time::Duration;

    fn ctx(seed: u8) -> LogContext {
        LogContext {
            identity: Arc::new(Identity::from_seed(&[seed; 32])),
            store: Arc::new(MemoryStore::new()),
            transport: Arc::new(Offline),
            config: ReplicaConfig::default(),
        }
    }

    async fn general(ctx: LogContext) -> EntryLog<String> {
        EntryLog::open(LogKind::Channel, "general", ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_append_then_all() {
        let log = general(ctx(1)).await;
        assert!(log.is_empty().await);

        log.append("one".to_string()).await.unwrap();
        log.append("two".to_string()).await.unwrap();
        log.append("three".to_string()).await.unwrap();

        assert_eq!(log.all(Limit::All).await, vec!["one", "two", "three"]);
        assert_eq!(log.all(Limit::Last(2)).await, vec!["two", "three"]);
        assert_eq!(log.heads().await.len(), 1);
    }

    #[tokio::test]
    async fn test_write_event_only_for_local_append() {
        let a = general(ctx(1)).await;
        let b = general(ctx(2)).await;
        let mut events = b.subscribe();

        a.append("from a".to_string()).await.unwrap();
        let report = b.merge(a.export().await).await.unwrap();
        assert_eq!(report.added, 1);
        assert!(matches!(
            events.try_recv(),
            Ok(LogEvent::Replicated { added: 1, .. })
        ));

        let id = b.append("from b".to_string()).await.unwrap();
        match events.try_recv() {
            Ok(LogEvent::Write { id: got, value, .. }) => {
                assert_eq!(got, id);
                assert_eq!(value, "from b");
            }
            other => panic!("expected write event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_merge_counts_duplicates_and_rejects() {
        let a = general(ctx(1)).await;
        let b = general(ctx(2)).await;
        a.append("hello".to_string()).await.unwrap();

        let mut exported = a.export().await;
        let mut forged = exported[0].clone();
        forged.payload = encode_payload(&"forged".to_string()).unwrap().into();
        exported.push(forged);

        let report = b.merge(exported.clone()).await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.rejected, 1);

        let again = b.merge(exported[..1].to_vec()).await.unwrap();
        assert_eq!(again.duplicates, 1);
        assert!(!again.changed());
    }

    #[tokio::test]
    async fn test_merge_rejects_other_log() {
        let general = general(ctx(1)).await;
        let random: EntryLog<String> = EntryLog::open(LogKind::Channel, "random", ctx(1))
            .await
            .unwrap();
        random.append("wrong room".to_string()).await.unwrap();

        let report = general.merge(random.export().await).await.unwrap();
        assert_eq!(report.rejected, 1);
        assert!(general.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_via_hub_and_ready_once() {
        let hub = MemoryHub::new();
        let mut a_ctx = ctx(1);
        a_ctx.transport = Arc::new(hub.connect(a_ctx.identity.peer_id()));
        let mut b_ctx = ctx(2);
        b_ctx.transport = Arc::new(hub.connect(b_ctx.identity.peer_id()));

        let a = general(a_ctx).await;
        let b = general(b_ctx).await;
        let mut events = b.subscribe();

        a.append("hi".to_string()).await.unwrap();
        let report = b.load().await.unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(b.all(Limit::All).await, vec!["hi"]);

        assert!(matches!(events.try_recv(), Ok(LogEvent::Replicated { .. })));
        assert!(matches!(events.try_recv(), Ok(LogEvent::Ready { .. })));

        b.load().await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_load_timeout_is_error_and_retryable() {
        let hub = MemoryHub::new();
        let mut a_ctx = ctx(1);
        a_ctx.transport = Arc::new(hub.connect(a_ctx.identity.peer_id()));
        let mut b_ctx = ctx(2);
        b_ctx.transport = Arc::new(hub.connect(b_ctx.identity.peer_id()));
        b_ctx.config.fetch_timeout = Duration::from_millis(20);

        let a = general(a_ctx).await;
        let b = general(b_ctx).await;
        a.append("late".to_string()).await.unwrap();

        hub.set_fetch_delay(Some(Duration::from_millis(200))).await;
        assert!(matches!(b.load().await, Err(ReplicaError::Timeout(_))));
        assert!(b.is_empty().await);

        hub.set_fetch_delay(None).await;
        assert_eq!(b.load().await.unwrap().added, 1);
    }

    fn root_entry(log: LogAddress, author: u16, text: &str) -> Entry {
        let mut seed = [0u8; 32];
        seed[..2].copy_from_slice(&author.to_le_bytes());
        seed[31] = 0xAA;
        EntryBuilder::new(log)
            .timestamp(author as i64)
            .payload(encode_payload(&text.to_string()).unwrap())
            .sign(&Identity::from_seed(&seed))
    }

    #[tokio::test]
    async fn test_append_caps_heads_and_stays_valid() {
        let dir = tempfile::tempdir().unwrap();
        let mut x_ctx = ctx(1);
        x_ctx.store = Arc::new(SqliteStore::open(dir.path().join("x.db")).unwrap());

        let x = general(x_ctx.clone()).await;
        let branches: Vec<Entry> = (0..=MAX_HEADS as u16)
            .map(|i| root_entry(x.address(), i, &format!("branch {}", i)))
            .collect();
        assert_eq!(x.merge(branches).await.unwrap().added, MAX_HEADS + 1);
        assert_eq!(x.heads().await.len(), MAX_HEADS + 1);

        let id = x.append("merge point".to_string()).await.unwrap();
        let appended = x
            .entries(Limit::All)
            .await
            .into_iter()
            .find(|e| e.compute_id() == id)
            .unwrap();
        assert_eq!(appended.heads().len(), MAX_HEADS);
        // The skipped branch and the new entry.
        assert_eq!(x.heads().await.len(), 2);

        let y = general(ctx(2)).await;
        let report = y.merge(x.export().await).await.unwrap();
        assert_eq!(report.added, MAX_HEADS + 2);
        assert_eq!(report.rejected, 0);

        drop(x);
        let reopened = general(x_ctx).await;
        assert_eq!(reopened.len().await, MAX_HEADS + 2);
        assert!(reopened.all(Limit::All).await.contains(&"merge point".to_string()));

        reopened.append("closing".to_string()).await.unwrap();
        assert_eq!(reopened.heads().await.len(), 1);
        assert_eq!(reopened.all(Limit::Last(1)).await, vec!["closing"]);
    }

    #[tokio::test]
    async fn test_heads_tracked_across_out_of_order_merge() {
        let a = general(ctx(1)).await;
        a.append("first".to_string()).await.unwrap();
        a.append("second".to_string()).await.unwrap();
        let mut exported = a.export().await;
        exported.reverse();

        let b = general(ctx(2)).await;
        for entry in exported {
            b.merge(vec![entry]).await.unwrap();
        }
        let side = root_entry(b.address(), 7, "side");
        b.merge(vec![side]).await.unwrap();

        let state = b.state.lock().await;
        let expected = parlor_core::frontier(&state.graph);
        assert_eq!(state.heads.iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(expected.len(), 2);
    }

    #[tokio::test]
    async fn test_reopen_restores_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn EntryStore> =
            Arc::new(SqliteStore::open(dir.path().join("parlor.db")).unwrap());
        let mut shared = ctx(1);
        shared.store = store;

        let first = general(shared.clone()).await;
        first.append("persisted".to_string()).await.unwrap();
        let hash = first.state_hash().await;
        drop(first);

        let reopened = general(shared).await;
        assert_eq!(reopened.all(Limit::All).await, vec!["persisted"]);
        assert_eq!(reopened.state_hash().await, hash);
    }
}
