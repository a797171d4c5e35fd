//! Change-feed messages.
//!
//! A change-feed response body is a JSON array of [`FeedMessage`]s. Change
//! messages carry committed row changes; control messages tell the client
//! that it has caught up (`up-to-date`) or that its position is no longer
//! valid and it must start over from a fresh snapshot (`must-refetch`).
//!
//! Position information travels in response headers:
//! - `feed-handle`: identifies the log the offsets belong to
//! - `feed-offset`: the position to resume from
//! - `feed-cursor`: opaque value echoed back on live requests
//! - `feed-covers`: on responses ending in `up-to-date`, the last committed
//!   transaction whose changes the client holds after applying it

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{Row, RowKey, TransactionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response header carrying the feed handle.
pub const FEED_HANDLE_HEADER: &str = "feed-handle";
/// Response header carrying the resume offset.
pub const FEED_OFFSET_HEADER: &str = "feed-offset";
/// Response header carrying the live cursor.
pub const FEED_CURSOR_HEADER: &str = "feed-cursor";
/// Response header carrying the last transaction covered by the response.
pub const FEED_COVERS_HEADER: &str = "feed-covers";
/// Content type of feed and mutation bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Kind of row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    /// Row was inserted.
    Insert,
    /// Row was updated.
    Update,
    /// Row was deleted.
    Delete,
}

/// A single committed row change.
///
/// Events read from the log carry the transaction id that committed them.
/// Snapshot rows have no transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Resource (table) the row belongs to.
    pub resource: String,
    /// Identity of the row.
    pub key: RowKey,
    /// Kind of change.
    pub operation: ChangeOperation,
    /// Row value after the change; the last value for deletes.
    pub row: Row,
    /// Transaction that committed the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl ChangeEvent {
    /// Creates an insert event.
    pub fn insert(resource: impl Into<String>, key: RowKey, row: Row) -> Self {
        Self::new(resource, key, ChangeOperation::Insert, row)
    }

    /// Creates an update event.
    pub fn update(resource: impl Into<String>, key: RowKey, row: Row) -> Self {
        Self::new(resource, key, ChangeOperation::Update, row)
    }

    /// Creates a delete event.
    pub fn delete(resource: impl Into<String>, key: RowKey, row: Row) -> Self {
        Self::new(resource, key, ChangeOperation::Delete, row)
    }

    fn new(resource: impl Into<String>, key: RowKey, operation: ChangeOperation, row: Row) -> Self {
        Self {
            resource: resource.into(),
            key,
            operation,
            row,
            transaction_id: None,
        }
    }

    /// Tags the event with the transaction that committed it.
    #[must_use]
    pub fn with_transaction(mut self, txid: TransactionId) -> Self {
        self.transaction_id = Some(txid);
        self
    }
}

/// One element of a change-feed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedMessage {
    /// A row change.
    Change(ChangeEvent),
    /// The client has seen everything committed so far.
    UpToDate,
    /// The client's position is invalid; it must discard its rows and
    /// resubscribe from offset `-1`.
    MustRefetch,
}

/// Position in a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Offset {
    /// Before the first message: the response starts with a snapshot.
    Before,
    /// After the log entry at this position.
    At(u64),
}

impl Offset {
    /// Returns the log position, treating `Before` as zero.
    pub fn position(self) -> u64 {
        match self {
            Offset::Before => 0,
            Offset::At(n) => n,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Before => f.write_str("-1"),
            Offset::At(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for Offset {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-1" => Ok(Offset::Before),
            other => other
                .parse::<u64>()
                .map(Offset::At)
                .map_err(|_| ProtocolError::InvalidOffset(s.to_string())),
        }
    }
}

/// A decoded change-feed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedBatch {
    /// Messages in delivery order.
    pub messages: Vec<FeedMessage>,
    /// Handle of the log the offset belongs to.
    pub handle: Option<String>,
    /// Offset to resume from.
    pub offset: Option<Offset>,
    /// Cursor to echo back on the next live request.
    pub cursor: Option<String>,
    /// Last transaction reflected once this batch is applied.
    pub covers: Option<TransactionId>,
}

impl FeedBatch {
    /// Creates a batch from messages, without position information.
    pub fn new(messages: Vec<FeedMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Decodes a response body plus the position headers.
    pub fn decode(
        body: &[u8],
        handle: Option<&str>,
        offset: Option<&str>,
        cursor: Option<&str>,
    ) -> ProtocolResult<Self> {
        Ok(Self {
            messages: decode_messages(body)?,
            handle: handle.map(str::to_string),
            offset: offset.map(str::parse::<Offset>).transpose()?,
            cursor: cursor.map(str::to_string),
            covers: None,
        })
    }

    /// Sets the covered transaction from the `feed-covers` header.
    pub fn with_covers(mut self, covers: Option<&str>) -> ProtocolResult<Self> {
        self.covers = covers.map(str::parse::<TransactionId>).transpose()?;
        Ok(self)
    }

    /// Returns true if the batch ends the client's catch-up.
    pub fn is_up_to_date(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, FeedMessage::UpToDate))
    }

    /// Returns true if the server asked the client to start over.
    pub fn must_refetch(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, FeedMessage::MustRefetch))
    }
}

/// Encodes feed messages as a JSON array.
pub fn encode_messages(messages: &[FeedMessage]) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(messages)?)
}

/// Decodes a JSON array of feed messages. An empty body decodes to no messages.
pub fn decode_messages(body: &[u8]) -> ProtocolResult<Vec<FeedMessage>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(body)?)
}
