//! Optimistic synced collection.
//!
//! A [`SyncedCollection`] mirrors one resource. Its view is the
//! authoritative rows received from the change feed with the pending local
//! mutations folded over them in submission order.
//!
//! ## Reconciliation
//!
//! - A write is applied to the view at once and sent to the gateway in the
//!   background. Calls for the same row are serialized.
//! - The gateway answers with a transaction id. The mutation is confirmed
//!   when a feed event with that id for the same row is applied, whichever
//!   of the two arrives first.
//! - A failed call removes the mutation, so the view falls back to the
//!   authoritative row.
//! - An up-to-date batch names the last transaction it covers. Any answered
//!   mutation at or below it is already reflected in the authoritative rows
//!   and is confirmed, even if its own event was never seen (a snapshot
//!   carries no transaction ids).

use crate::config::CollectionConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransport;
use crate::pending::{LocalKey, Mutation, MutationKind, MutationState, PendingMutation};
use crate::transport::CollectionTransport;
use parking_lot::Mutex;
use rowsync_sync_protocol::{
    ChangeEvent, ChangeOperation, FeedBatch, FeedMessage, MutationResponse, Offset, Row, RowKey,
    SubscriptionParams, TransactionId,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A change of one row in the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewChange {
    /// Row key.
    pub key: LocalKey,
    /// New row, `None` when the row left the view.
    pub row: Option<Row>,
}

#[derive(Debug, Clone)]
enum Readiness {
    Loading,
    Ready,
    Failed(SyncError),
}

/// Resolves to the authoritative row once a mutation is confirmed, or to
/// the error that rejected it.
#[derive(Debug)]
pub struct MutationHandle {
    id: u64,
    key: LocalKey,
    rx: oneshot::Receiver<SyncResult<Row>>,
}

impl MutationHandle {
    fn failed(key: LocalKey, err: SyncError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { id: 0, key, rx }
    }

    /// Mutation id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Key of the row in the view at submission time.
    pub fn key(&self) -> &LocalKey {
        &self.key
    }
}

impl Future for MutationHandle {
    type Output = SyncResult<Row>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SyncError::Closed)))
    }
}

/// A client-side collection kept in sync with one resource.
///
/// Cloning is cheap; clones share the same state. The feed task stops when
/// [`close`](Self::close) is called or the last clone is dropped. All
/// methods that start work must be called within a tokio runtime.
#[derive(Clone)]
pub struct SyncedCollection {
    inner: Arc<Inner>,
}

impl SyncedCollection {
    /// Creates a collection on a transport.
    pub fn new(config: CollectionConfig, transport: Arc<dyn CollectionTransport>) -> Self {
        let resource = config
            .resource_path
            .trim_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let (ready, _) = watch::channel(Readiness::Loading);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(config.observed_capacity)),
                config,
                resource,
                transport,
                ready,
                changes,
                feed_task: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Creates a collection that talks HTTP to a sync server.
    pub fn http(config: CollectionConfig) -> SyncResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CollectionConfig {
        &self.inner.config
    }

    /// Starts the feed and waits until the first snapshot is applied.
    pub async fn preload(&self) -> SyncResult<()> {
        if self.inner.is_closed() {
            return Err(SyncError::Closed);
        }
        self.inner.ensure_feed();

        let mut ready = self.inner.ready.subscribe();
        loop {
            let readiness = (*ready.borrow_and_update()).clone();
            match readiness {
                Readiness::Ready => return Ok(()),
                Readiness::Failed(err) => return Err(err),
                Readiness::Loading => {}
            }
            if ready.changed().await.is_err() {
                return Err(SyncError::Closed);
            }
        }
    }

    /// Returns true once the first snapshot has been applied.
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.ready.borrow(), Readiness::Ready)
    }

    /// Returns the error that stopped the feed, if any.
    pub fn last_error(&self) -> Option<SyncError> {
        self.inner.state.lock().last_error.clone()
    }

    /// Inserts a row.
    ///
    /// A row without an identity value is shown under a placeholder key
    /// until the server assigns one.
    pub fn insert(&self, row: Row) -> MutationHandle {
        self.inner.submit(MutationKind::Insert, None, row)
    }

    /// Patches a row.
    pub fn update(&self, key: impl Into<LocalKey>, patch: Row) -> MutationHandle {
        self.inner.submit(MutationKind::Update, Some(key.into()), patch)
    }

    /// Deletes a row.
    pub fn delete(&self, key: impl Into<LocalKey>) -> MutationHandle {
        self.inner.submit(MutationKind::Delete, Some(key.into()), Row::new())
    }

    /// Returns a row of the view.
    ///
    /// Placeholder keys keep resolving after the row was re-keyed.
    pub fn get(&self, key: impl Into<LocalKey>) -> Option<Row> {
        let state = self.inner.state.lock();
        let key = state.canonical(key.into());
        state.view.get(&key).cloned()
    }

    /// Returns all rows of the view in key order.
    pub fn rows(&self) -> Vec<(LocalKey, Row)> {
        let state = self.inner.state.lock();
        state
            .view
            .iter()
            .map(|(key, row)| (key.clone(), row.clone()))
            .collect()
    }

    /// Returns the number of rows in the view.
    pub fn len(&self) -> usize {
        self.inner.state.lock().view.len()
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().view.is_empty()
    }

    /// Returns the mutations awaiting confirmation, in submission order.
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.inner.state.lock().pending.clone()
    }

    /// Subscribes to view changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewChange> {
        self.inner.changes.subscribe()
    }

    /// Stops the feed and fails every unconfirmed mutation with
    /// [`SyncError::Closed`].
    pub fn close(&self) {
        self.inner.close();
    }
}

impl std::fmt::Debug for SyncedCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncedCollection")
            .field("resource", &self.inner.resource)
            .field("closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

struct Inner {
    config: CollectionConfig,
    resource: String,
    transport: Arc<dyn CollectionTransport>,
    state: Mutex<State>,
    ready: watch::Sender<Readiness>,
    changes: broadcast::Sender<ViewChange>,
    feed_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_feed(self: &Arc<Self>) {
        let mut task = self.feed_task.lock();
        if task.is_none() && !self.is_closed() {
            *task = Some(tokio::spawn(feed_loop(
                Arc::downgrade(self),
                Arc::clone(&self.transport),
            )));
        }
    }

    fn notify(&self, changes: Vec<ViewChange>) {
        for change in changes {
            // No receivers is fine.
            let _ = self.changes.send(change);
        }
    }

    fn params(&self) -> SubscriptionParams {
        self.state.lock().position.params()
    }

    fn submit(
        self: &Arc<Self>,
        kind: MutationKind,
        key: Option<LocalKey>,
        payload: Row,
    ) -> MutationHandle {
        if self.is_closed() {
            let key = key.unwrap_or(LocalKey::Pending(0));
            return MutationHandle::failed(key, SyncError::Closed);
        }
        self.ensure_feed();

        let (done_tx, done_rx) = oneshot::channel();
        let (step_tx, step_rx) = oneshot::channel();

        let (id, key, previous, changes) = {
            let mut state = self.state.lock();
            let id = state.next_mutation();
            let key = match (kind, key) {
                (MutationKind::Insert, _) => {
                    match RowKey::from_row(&payload, &self.config.identity_column) {
                        Some(key) => LocalKey::Synced(key),
                        None => state.next_placeholder(),
                    }
                }
                (_, Some(key)) => state.canonical(key),
                (_, None) => state.next_placeholder(),
            };

            let target = key.row_key().cloned();
            let mutation = match kind {
                MutationKind::Insert => Mutation::insert(&self.resource, payload),
                MutationKind::Update => Mutation::update(&self.resource, target, payload),
                MutationKind::Delete => Mutation::delete(&self.resource, target),
            };
            state
                .pending
                .push(PendingMutation::new(id, mutation, key.clone()));
            state.waiters.insert(id, done_tx);
            let previous = state.tails.insert(
                key.clone(),
                Tail {
                    mutation: id,
                    done: step_rx,
                },
            );
            let changes = state.rebuild_view();
            (id, key, previous.map(|tail| tail.done), changes)
        };

        tracing::debug!(resource = %self.resource, id, %kind, key = %key, "applied local mutation");
        self.notify(changes);
        tokio::spawn(run_mutation(Arc::clone(self), id, kind, key.clone(), previous, step_tx));

        MutationHandle {
            id,
            key,
            rx: done_rx,
        }
    }

    // Marks the mutation Sent and returns what to send.
    fn mark_sent(&self, id: u64, target: Option<RowKey>) -> Option<Mutation> {
        let mut state = self.state.lock();
        let pending = state.pending.iter_mut().find(|p| p.id == id)?;
        if let Err(err) = pending.transition(MutationState::Sent) {
            tracing::warn!(id, error = %err, "mutation cannot be sent");
            return None;
        }
        if pending.mutation.kind != MutationKind::Insert {
            pending.mutation.key = target;
        }
        Some(pending.mutation.clone())
    }

    // Records the gateway response. Returns the row's server identity.
    fn accept(&self, id: u64, response: MutationResponse) -> Option<RowKey> {
        let mut state = self.state.lock();
        let pos = state.pending.iter().position(|p| p.id == id)?;

        let kind = state.pending[pos].mutation.kind;
        let server_key = match kind {
            MutationKind::Insert => RowKey::from_row(&response.item, &self.config.identity_column)
                .or_else(|| state.pending[pos].key.row_key().cloned()),
            _ => state.pending[pos].mutation.key.clone(),
        };

        let placeholder = match state.pending[pos].key {
            LocalKey::Pending(n) => Some(n),
            LocalKey::Synced(_) => None,
        };
        if let (Some(placeholder), Some(key)) = (placeholder, server_key.clone()) {
            state.rekey(placeholder, key);
        }

        let txid = response.transaction_id;
        let covered = state.covered.is_some_and(|covered| txid <= covered);
        let pending = &mut state.pending[pos];
        pending.transaction_id = Some(txid);
        if kind != MutationKind::Delete {
            pending.mutation.payload = response.item.clone();
        }
        pending.mutation.key = server_key.clone();
        pending.response = Some(response.item.clone());

        let observed = server_key
            .as_ref()
            .is_some_and(|key| state.observed.take(&(txid, key.clone())));
        if observed {
            state.confirm(id, response.item);
        } else if covered {
            state.confirm_covered(txid);
        }

        let changes = state.rebuild_view();
        drop(state);
        self.notify(changes);
        server_key
    }

    fn reject(&self, id: u64, err: SyncError) {
        let mut state = self.state.lock();
        let Some(pos) = state.pending.iter().position(|p| p.id == id) else {
            return;
        };
        let mut pending = state.pending.remove(pos);
        let _ = pending.transition(MutationState::Rejected);
        tracing::debug!(
            resource = %self.resource,
            id,
            kind = %pending.mutation.kind,
            key = %pending.key,
            error = %err,
            "mutation rejected"
        );
        if let Some(waiter) = state.waiters.remove(&id) {
            let _ = waiter.send(Err(err));
        }

        let changes = state.rebuild_view();
        drop(state);
        self.notify(changes);
    }

    fn release_tail(&self, id: u64, key: &LocalKey) {
        let mut state = self.state.lock();
        let key = state.canonical(key.clone());
        if state.tails.get(&key).is_some_and(|tail| tail.mutation == id) {
            state.tails.remove(&key);
        }
    }

    fn resolve(&self, key: &LocalKey) -> Option<RowKey> {
        let state = self.state.lock();
        state.canonical(key.clone()).row_key().cloned()
    }

    fn apply_batch(&self, batch: FeedBatch) {
        let mut state = self.state.lock();

        if batch.must_refetch() {
            tracing::info!(resource = %self.resource, "feed asked for a refetch");
            state.synced.clear();
            state.position = Position::default();
            state.covered = None;
            let changes = state.rebuild_view();
            drop(state);
            self.notify(changes);
            return;
        }

        for message in batch.messages.iter() {
            if let FeedMessage::Change(event) = message {
                state.apply_event(event);
            }
        }

        if batch.handle.is_some() {
            state.position.handle = batch.handle.clone();
        }
        if let Some(offset) = batch.offset {
            state.position.offset = Some(offset);
        }
        if batch.cursor.is_some() {
            state.position.cursor = batch.cursor.clone();
        }

        let up_to_date = batch.is_up_to_date();
        if up_to_date {
            if !state.position.live {
                tracing::debug!(resource = %self.resource, rows = state.synced.len(), "caught up");
            }
            state.position.live = true;
            if let Some(covers) = batch.covers {
                state.covered = Some(state.covered.map_or(covers, |c| c.max(covers)));
                state.confirm_covered(covers);
            }
        }

        let changes = state.rebuild_view();
        drop(state);
        self.notify(changes);

        if up_to_date {
            self.ready.send_if_modified(|readiness| match readiness {
                Readiness::Loading => {
                    *readiness = Readiness::Ready;
                    true
                }
                _ => false,
            });
        }
    }

    fn fail(&self, err: SyncError) {
        tracing::warn!(resource = %self.resource, error = %err, "change feed stopped");
        self.state.lock().last_error = Some(err.clone());
        self.fail_if_loading(err);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.feed_task.lock().take() {
            task.abort();
        }

        let changes = {
            let mut state = self.state.lock();
            for (_, waiter) in state.waiters.drain() {
                let _ = waiter.send(Err(SyncError::Closed));
            }
            state.pending.clear();
            state.tails.clear();
            state.rebuild_view()
        };
        self.notify(changes);

        self.fail_if_loading(SyncError::Closed);
        tracing::debug!(resource = %self.resource, "collection closed");
    }

    fn fail_if_loading(&self, err: SyncError) {
        self.ready.send_if_modified(|readiness| match readiness {
            Readiness::Loading => {
                *readiness = Readiness::Failed(err);
                true
            }
            _ => false,
        });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.feed_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn run_mutation(
    inner: Arc<Inner>,
    id: u64,
    kind: MutationKind,
    key: LocalKey,
    previous: Option<oneshot::Receiver<Option<RowKey>>>,
    step: oneshot::Sender<Option<RowKey>>,
) {
    // The previous call on this row has returned once its step arrives.
    let target = match previous {
        Some(previous) => previous.await.unwrap_or(None),
        None => inner.resolve(&key),
    };

    let next = if kind != MutationKind::Insert && target.is_none() {
        let err = if inner.is_closed() {
            SyncError::Closed
        } else {
            SyncError::DependencyRejected {
                key: key.to_string(),
            }
        };
        inner.reject(id, err);
        None
    } else {
        match inner.mark_sent(id, target.clone()) {
            None => target,
            Some(mutation) => {
                let result = match (mutation.kind, &target) {
                    (MutationKind::Update, Some(row)) => {
                        inner.transport.update(row, &mutation.payload).await
                    }
                    (MutationKind::Delete, Some(row)) => inner.transport.delete(row).await,
                    _ => inner.transport.create(&mutation.payload).await,
                };
                match result {
                    Ok(response) => inner.accept(id, response),
                    Err(err) => {
                        inner.reject(id, err);
                        if kind == MutationKind::Insert {
                            None
                        } else {
                            target
                        }
                    }
                }
            }
        }
    };

    inner.release_tail(id, &key);
    let _ = step.send(next);
}

async fn feed_loop(inner: Weak<Inner>, transport: Arc<dyn CollectionTransport>) {
    let mut failures = 0u32;
    loop {
        let (params, retry) = match inner.upgrade() {
            Some(inner) => (inner.params(), inner.config.retry.clone()),
            None => return,
        };

        match transport.poll(&params).await {
            Ok(batch) => {
                failures = 0;
                match inner.upgrade() {
                    Some(inner) => inner.apply_batch(batch),
                    None => return,
                }
            }
            Err(err) if err.is_retryable() && retry.allows_retry(failures + 1) => {
                failures += 1;
                let delay = retry.delay_for_attempt(failures);
                tracing::warn!(error = %err, attempt = failures, ?delay, "feed request failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if let Some(inner) = inner.upgrade() {
                    inner.fail(err);
                }
                return;
            }
        }
    }
}

struct Tail {
    mutation: u64,
    done: oneshot::Receiver<Option<RowKey>>,
}

#[derive(Debug, Default)]
struct Position {
    handle: Option<String>,
    offset: Option<Offset>,
    cursor: Option<String>,
    live: bool,
}

impl Position {
    fn params(&self) -> SubscriptionParams {
        SubscriptionParams {
            live: self.live,
            table: None,
            handle: self.handle.clone(),
            offset: Some(self.offset.unwrap_or(Offset::Before)),
            cursor: self.cursor.clone(),
        }
    }
}

// Bounded set of feed events that confirmed no pending mutation.
struct Observed {
    order: VecDeque<(TransactionId, RowKey)>,
    entries: HashSet<(TransactionId, RowKey)>,
    capacity: usize,
}

impl Observed {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            entries: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, entry: (TransactionId, RowKey)) {
        if !self.entries.insert(entry.clone()) {
            return;
        }
        self.order.push_back(entry);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn take(&mut self, entry: &(TransactionId, RowKey)) -> bool {
        if !self.entries.remove(entry) {
            return false;
        }
        self.order.retain(|e| e != entry);
        true
    }
}

struct State {
    synced: BTreeMap<RowKey, Row>,
    pending: Vec<PendingMutation>,
    view: BTreeMap<LocalKey, Row>,
    observed: Observed,
    tails: HashMap<LocalKey, Tail>,
    aliases: HashMap<u64, RowKey>,
    waiters: HashMap<u64, oneshot::Sender<SyncResult<Row>>>,
    position: Position,
    // Last transaction the authoritative rows are known to reflect.
    covered: Option<TransactionId>,
    mutations: u64,
    placeholders: u64,
    last_error: Option<SyncError>,
}

impl State {
    fn new(observed_capacity: usize) -> Self {
        Self {
            synced: BTreeMap::new(),
            pending: Vec::new(),
            view: BTreeMap::new(),
            observed: Observed::new(observed_capacity),
            tails: HashMap::new(),
            aliases: HashMap::new(),
            waiters: HashMap::new(),
            position: Position::default(),
            covered: None,
            mutations: 0,
            placeholders: 0,
            last_error: None,
        }
    }

    fn next_mutation(&mut self) -> u64 {
        self.mutations += 1;
        self.mutations
    }

    fn next_placeholder(&mut self) -> LocalKey {
        self.placeholders += 1;
        LocalKey::Pending(self.placeholders)
    }

    fn canonical(&self, key: LocalKey) -> LocalKey {
        match key {
            LocalKey::Pending(n) => match self.aliases.get(&n) {
                Some(key) => LocalKey::Synced(key.clone()),
                None => LocalKey::Pending(n),
            },
            key => key,
        }
    }

    fn rekey(&mut self, placeholder: u64, key: RowKey) {
        let from = LocalKey::Pending(placeholder);
        let to = LocalKey::Synced(key.clone());
        self.aliases.insert(placeholder, key.clone());

        for pending in self.pending.iter_mut().filter(|p| p.key == from) {
            pending.key = to.clone();
            pending.mutation.key = Some(key.clone());
        }
        if let Some(tail) = self.tails.remove(&from) {
            self.tails.insert(to, tail);
        }
    }

    fn apply_event(&mut self, event: &ChangeEvent) {
        match event.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                self.synced.insert(event.key.clone(), event.row.clone());
            }
            ChangeOperation::Delete => {
                self.synced.remove(&event.key);
            }
        }

        let Some(txid) = event.transaction_id else {
            return;
        };
        let key = LocalKey::Synced(event.key.clone());
        let confirmed = self
            .pending
            .iter()
            .find(|p| {
                p.state == MutationState::Sent && p.transaction_id == Some(txid) && p.key == key
            })
            .map(|p| p.id);

        match confirmed {
            Some(id) => self.confirm(id, event.row.clone()),
            None => self.observed.insert((txid, event.key.clone())),
        }
    }

    // Answered mutations committed at or before `covers` are part of the
    // authoritative rows already.
    fn confirm_covered(&mut self, covers: TransactionId) {
        let answered: Vec<(u64, Row)> = self
            .pending
            .iter()
            .filter(|p| {
                p.state == MutationState::Sent
                    && p.transaction_id.is_some_and(|txid| txid <= covers)
            })
            .map(|p| {
                let row = p
                    .key
                    .row_key()
                    .and_then(|key| self.synced.get(key).cloned())
                    .or_else(|| p.response.clone())
                    .unwrap_or_default();
                (p.id, row)
            })
            .collect();
        for (id, row) in answered {
            self.confirm(id, row);
        }
    }

    fn confirm(&mut self, id: u64, row: Row) {
        let Some(pos) = self.pending.iter().position(|p| p.id == id) else {
            return;
        };
        let mut pending = self.pending.remove(pos);
        if let Err(err) = pending.transition(MutationState::Confirmed) {
            tracing::warn!(id, error = %err, "unexpected confirmation");
        }
        tracing::debug!(
            id,
            kind = %pending.mutation.kind,
            key = %pending.key,
            txid = ?pending.transaction_id,
            "mutation confirmed"
        );
        if let Some(waiter) = self.waiters.remove(&id) {
            let _ = waiter.send(Ok(row));
        }
    }

    fn rebuild_view(&mut self) -> Vec<ViewChange> {
        let mut view: BTreeMap<LocalKey, Row> = self
            .synced
            .iter()
            .map(|(key, row)| (LocalKey::Synced(key.clone()), row.clone()))
            .collect();
        for pending in &self.pending {
            let current = view.remove(&pending.key);
            if let Some(row) = pending.overlay(current) {
                view.insert(pending.key.clone(), row);
            }
        }

        let mut changes = Vec::new();
        for key in self.view.keys() {
            if !view.contains_key(key) {
                changes.push(ViewChange {
                    key: key.clone(),
                    row: None,
                });
            }
        }
        for (key, row) in &view {
            if self.view.get(key) != Some(row) {
                changes.push(ViewChange {
                    key: key.clone(),
                    row: Some(row.clone()),
                });
            }
        }

        self.view = view;
        changes
    }
}
