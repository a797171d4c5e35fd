//! Change-feed service interface.
//!
//! A [`ChangeFeedService`] answers one subscription request with a status,
//! headers and a streamed body of JSON feed messages. The server proxies it
//! to clients; [`MemoryChangeFeed`] serves a [`MemoryStore`] directly.
//!
//! [`MemoryStore`]: crate::MemoryStore

mod memory;

pub use memory::{MemoryChangeFeed, MemoryFeedConfig};

use crate::error::{CoreError, CoreResult};
use crate::predicate::Predicate;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, TryStreamExt};
use rowsync_sync_protocol::{
    FeedBatch, SubscriptionParams, FEED_COVERS_HEADER, FEED_CURSOR_HEADER, FEED_HANDLE_HEADER,
    FEED_OFFSET_HEADER,
};
use std::fmt;
use std::pin::Pin;

/// Streamed response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CoreError>> + Send>>;

/// A subscription request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedRequest {
    /// Allow-listed client parameters.
    pub params: SubscriptionParams,
    /// Mandatory server-side row filter.
    pub filter: Option<Predicate>,
}

impl FeedRequest {
    /// Creates a request without a filter.
    pub fn new(params: SubscriptionParams) -> Self {
        Self {
            params,
            filter: None,
        }
    }

    /// Attaches a row filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A subscription response.
pub struct FeedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names in lowercase.
    pub headers: Vec<(String, String)>,
    /// Streamed body.
    pub body: ByteStream,
}

impl FeedResponse {
    /// Creates a response with a streamed body.
    pub fn new(status: u16, headers: Vec<(String, String)>, body: ByteStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Creates a response with a body that is already in memory.
    pub fn from_bytes(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(status, headers, Box::pin(stream::once(async move { Ok(body) })))
    }

    /// Returns the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Collects the whole body.
    pub async fn into_bytes(self) -> CoreResult<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        let mut body = BytesMut::new();
        for chunk in chunks {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Collects the body and decodes it together with the position headers.
    pub async fn into_batch(self) -> CoreResult<FeedBatch> {
        let handle = self.header(FEED_HANDLE_HEADER).map(str::to_string);
        let offset = self.header(FEED_OFFSET_HEADER).map(str::to_string);
        let cursor = self.header(FEED_CURSOR_HEADER).map(str::to_string);
        let covers = self.header(FEED_COVERS_HEADER).map(str::to_string);
        let body = self.into_bytes().await?;
        let batch = FeedBatch::decode(
            &body,
            handle.as_deref(),
            offset.as_deref(),
            cursor.as_deref(),
        )?;
        Ok(batch.with_covers(covers.as_deref())?)
    }
}

impl fmt::Debug for FeedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// An upstream change-feed service.
#[async_trait]
pub trait ChangeFeedService: Send + Sync {
    /// Answers one subscription request.
    async fn subscribe(&self, request: FeedRequest) -> CoreResult<FeedResponse>;
}
