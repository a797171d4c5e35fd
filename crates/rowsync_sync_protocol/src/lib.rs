//! # rowsync Sync Protocol
//!
//! Wire types shared by the rowsync server and its clients.
//!
//! This crate provides:
//! - `RowKey`, `Row` and `TransactionId`
//! - `ChangeEvent` and `FeedMessage` for change-feed responses
//! - `SubscriptionParams` with the subscription query allow-list
//! - `MutationResponse` and structured `ErrorBody` payloads
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod error;
mod messages;
mod subscription;
mod types;

pub use change_feed::{
    decode_messages, encode_messages, ChangeEvent, ChangeOperation, FeedBatch, FeedMessage,
    Offset, CONTENT_TYPE_JSON, FEED_COVERS_HEADER, FEED_CURSOR_HEADER, FEED_HANDLE_HEADER,
    FEED_OFFSET_HEADER,
};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ErrorBody, ErrorKind, MutationResponse};
pub use subscription::{SubscriptionParams, ALLOWED_PARAMS, WHERE_PARAM};
pub use types::{Row, RowKey, TransactionId};
