//! Change feed served from a [`MemoryStore`].

use super::{ChangeFeedService, FeedRequest, FeedResponse};
use crate::error::{CoreError, CoreResult};
use crate::predicate::Predicate;
use crate::store::{ChangeLog, LogHead, MemoryStore};
use async_trait::async_trait;
use rowsync_sync_protocol::{
    encode_messages, ChangeEvent, FeedMessage, Offset, TransactionId, CONTENT_TYPE_JSON,
    FEED_COVERS_HEADER, FEED_CURSOR_HEADER, FEED_HANDLE_HEADER, FEED_OFFSET_HEADER,
};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`MemoryChangeFeed`].
#[derive(Debug, Clone)]
pub struct MemoryFeedConfig {
    /// How long a live request waits for new changes.
    pub live_timeout: Duration,
    /// Maximum log entries examined per response.
    pub max_batch: usize,
}

impl Default for MemoryFeedConfig {
    fn default() -> Self {
        Self {
            live_timeout: Duration::from_secs(20),
            max_batch: 1000,
        }
    }
}

impl MemoryFeedConfig {
    /// Sets the live long-poll timeout.
    #[must_use]
    pub fn with_live_timeout(mut self, timeout: Duration) -> Self {
        self.live_timeout = timeout;
        self
    }

    /// Sets the maximum entries per response.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }
}

/// Serves a [`MemoryStore`]'s snapshot and change log as a change feed.
///
/// - `offset=-1` returns the filtered rows as insert messages without
///   transaction ids, then `up-to-date`
/// - `offset=N` returns the filtered log entries after `N`, then
///   `up-to-date` once the log is exhausted
/// - `live=true` waits up to the live timeout when nothing is new
/// - an unknown handle or an offset outside the retained log yields 409 with
///   `must-refetch`
/// - responses ending in `up-to-date` name the last transaction they cover
#[derive(Debug)]
pub struct MemoryChangeFeed {
    store: Arc<MemoryStore>,
    config: MemoryFeedConfig,
}

impl MemoryChangeFeed {
    /// Creates a feed with default configuration.
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_config(store, MemoryFeedConfig::default())
    }

    /// Creates a feed with custom configuration.
    pub fn with_config(store: Arc<MemoryStore>, config: MemoryFeedConfig) -> Self {
        Self { store, config }
    }

    async fn snapshot(&self, table: &str, filter: &Predicate) -> CoreResult<FeedResponse> {
        let (rows, head) = self.store.snapshot(table, filter).await;
        let mut messages: Vec<FeedMessage> = rows
            .into_iter()
            .map(|(key, row)| FeedMessage::Change(ChangeEvent::insert(table, key, row)))
            .collect();
        messages.push(FeedMessage::UpToDate);

        tracing::debug!(table, rows = messages.len() - 1, offset = head.offset, "serving snapshot");
        respond(200, self.store.log(), head.offset, head.transaction_id, &messages)
    }

    async fn changes_after(
        &self,
        table: &str,
        filter: &Predicate,
        after: u64,
        live: bool,
    ) -> CoreResult<FeedResponse> {
        let log = self.store.log();
        // Subscribe before reading so a commit in between still wakes us.
        let mut watch = log.watch();
        let (mut messages, mut offset, mut covers) = self.read(log, table, filter, after);

        if live
            && is_idle(&messages)
            && tokio::time::timeout(self.config.live_timeout, watch.changed())
                .await
                .is_ok()
        {
            (messages, offset, covers) = self.read(log, table, filter, after);
        }

        tracing::debug!(table, after, offset, messages = messages.len(), live, "serving changes");
        respond(200, log, offset, covers, &messages)
    }

    fn read(
        &self,
        log: &ChangeLog,
        table: &str,
        filter: &Predicate,
        after: u64,
    ) -> (Vec<FeedMessage>, u64, Option<TransactionId>) {
        let (entries, head): (_, LogHead) = log.poll_with_head(after, self.config.max_batch);
        let offset = entries.last().map_or(after, |e| e.offset);

        let mut messages: Vec<FeedMessage> = entries
            .iter()
            .filter(|e| e.table == table)
            .filter_map(|e| e.visible_event(Some(filter)))
            .map(FeedMessage::Change)
            .collect();
        let mut covers = None;
        if offset >= head.offset {
            messages.push(FeedMessage::UpToDate);
            covers = head.transaction_id;
        }
        (messages, offset, covers)
    }
}

fn is_idle(messages: &[FeedMessage]) -> bool {
    messages
        .iter()
        .all(|m| matches!(m, FeedMessage::UpToDate))
}

fn respond(
    status: u16,
    log: &ChangeLog,
    offset: u64,
    covers: Option<TransactionId>,
    messages: &[FeedMessage],
) -> CoreResult<FeedResponse> {
    let body = encode_messages(messages)?;
    let mut headers = vec![
        ("content-type".to_string(), CONTENT_TYPE_JSON.to_string()),
        ("content-length".to_string(), body.len().to_string()),
        (FEED_HANDLE_HEADER.to_string(), log.handle().to_string()),
        (FEED_OFFSET_HEADER.to_string(), Offset::At(offset).to_string()),
        (FEED_CURSOR_HEADER.to_string(), log.latest_offset().to_string()),
    ];
    if let Some(txid) = covers {
        headers.push((FEED_COVERS_HEADER.to_string(), txid.to_string()));
    }
    Ok(FeedResponse::from_bytes(status, headers, body))
}

fn must_refetch(log: &ChangeLog) -> CoreResult<FeedResponse> {
    let body = encode_messages(&[FeedMessage::MustRefetch])?;
    let headers = vec![
        ("content-type".to_string(), CONTENT_TYPE_JSON.to_string()),
        ("content-length".to_string(), body.len().to_string()),
        (FEED_HANDLE_HEADER.to_string(), log.handle().to_string()),
        (FEED_OFFSET_HEADER.to_string(), Offset::Before.to_string()),
    ];
    Ok(FeedResponse::from_bytes(409, headers, body))
}

#[async_trait]
impl ChangeFeedService for MemoryChangeFeed {
    async fn subscribe(&self, request: FeedRequest) -> CoreResult<FeedResponse> {
        let params = request.params;
        let table = params
            .table
            .ok_or_else(|| CoreError::invalid_operation("subscription requires a table"))?;
        let filter = request.filter.unwrap_or_default();
        let log = self.store.log();

        match params.offset.unwrap_or(Offset::Before) {
            Offset::Before => self.snapshot(&table, &filter).await,
            Offset::At(after) => {
                let known_handle = params.handle.as_deref().map_or(true, |h| h == log.handle());
                if !known_handle || !log.can_resume_from(after) {
                    tracing::debug!(table = %table, after, "position no longer valid, asking for refetch");
                    return must_refetch(log);
                }
                self.changes_after(&table, &filter, after, params.live).await
            }
        }
    }
}
