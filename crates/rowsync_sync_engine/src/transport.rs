//! Transport layer abstraction for synced collections.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rowsync_sync_protocol::{FeedBatch, MutationResponse, Row, RowKey, SubscriptionParams};
use std::collections::VecDeque;
use tokio::sync::{mpsc, oneshot};

/// A collection transport reaches one resource's gateway and change feed.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process, mock for testing, etc.).
#[async_trait]
pub trait CollectionTransport: Send + Sync {
    /// Creates a row.
    async fn create(&self, row: &Row) -> SyncResult<MutationResponse>;

    /// Patches the row with the given identity.
    async fn update(&self, key: &RowKey, patch: &Row) -> SyncResult<MutationResponse>;

    /// Deletes the row with the given identity.
    async fn delete(&self, key: &RowKey) -> SyncResult<MutationResponse>;

    /// Fetches the next change-feed batch.
    ///
    /// A `must-refetch` answer is returned as a batch, not an error.
    async fn poll(&self, params: &SubscriptionParams) -> SyncResult<FeedBatch>;
}

/// A call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `create(row)`.
    Create(Row),
    /// `update(key, patch)`.
    Update(RowKey, Row),
    /// `delete(key)`.
    Delete(RowKey),
}

type Reply = SyncResult<MutationResponse>;

/// A scripted transport for testing.
///
/// Feed batches are served in the order they are pushed; `poll` waits
/// while none is queued. Mutation calls consume queued replies in order;
/// a deferred reply holds its call until the test sends it.
pub struct MockTransport {
    batch_tx: mpsc::UnboundedSender<SyncResult<FeedBatch>>,
    batch_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SyncResult<FeedBatch>>>,
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
    calls: Mutex<Vec<MockCall>>,
    polls: Mutex<Vec<SubscriptionParams>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        let (batch_tx, batch_rx) = mpsc::unbounded_channel();
        Self {
            batch_tx,
            batch_rx: tokio::sync::Mutex::new(batch_rx),
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a feed batch.
    pub fn push_batch(&self, batch: FeedBatch) {
        let _ = self.batch_tx.send(Ok(batch));
    }

    /// Queues a feed failure.
    pub fn push_poll_error(&self, err: SyncError) {
        let _ = self.batch_tx.send(Err(err));
    }

    /// Queues the reply of the next mutation call.
    pub fn push_reply(&self, reply: Reply) {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(reply);
        self.replies.lock().push_back(rx);
    }

    /// Queues a reply that is released by sending on the returned channel.
    pub fn defer_reply(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().push_back(rx);
        tx
    }

    /// Returns the mutation calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Returns the parameters of every poll made so far.
    pub fn polls(&self) -> Vec<SubscriptionParams> {
        self.polls.lock().clone()
    }

    async fn reply(&self, call: MockCall) -> Reply {
        self.calls.lock().push(call);
        let next = self.replies.lock().pop_front();
        match next {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(SyncError::transport_fatal("mock reply dropped"))),
            None => Err(SyncError::transport_fatal("no mock reply queued")),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CollectionTransport for MockTransport {
    async fn create(&self, row: &Row) -> SyncResult<MutationResponse> {
        self.reply(MockCall::Create(row.clone())).await
    }

    async fn update(&self, key: &RowKey, patch: &Row) -> SyncResult<MutationResponse> {
        self.reply(MockCall::Update(key.clone(), patch.clone())).await
    }

    async fn delete(&self, key: &RowKey) -> SyncResult<MutationResponse> {
        self.reply(MockCall::Delete(key.clone())).await
    }

    async fn poll(&self, params: &SubscriptionParams) -> SyncResult<FeedBatch> {
        self.polls.lock().push(params.clone());
        let mut rx = self.batch_rx.lock().await;
        match rx.recv().await {
            Some(batch) => batch,
            None => Err(SyncError::Closed),
        }
    }
}
