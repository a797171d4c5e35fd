//! # rowsync Core
//!
//! Server-side building blocks for rowsync.
//!
//! This crate provides:
//! - `ResourceDescriptor`: identity, validation shapes and access policy of
//!   one synchronized resource
//! - `AccessDecision` / `AccessPolicy`: row-level access predicates
//! - `Predicate`: row filters that evaluate locally and render upstream
//! - `Store` / `StoreTransaction`: the transactional backend interface,
//!   with the in-memory `MemoryStore`
//! - `ChangeFeedService`: the upstream change-feed interface, with the
//!   in-memory `MemoryChangeFeed`
//!
//! ## Key Invariants
//!
//! - Access predicates are pure: they see the session and the proposed or
//!   target data, never the store
//! - A write and the read of its transaction id commit together or not at all
//! - Transaction ids are issued monotonically in commit order
//! - Identity values are never reused within a table

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access;
mod descriptor;
mod error;
mod feed;
mod predicate;
mod session;
mod shape;
mod store;

pub use access::{AccessDecision, AccessPolicy, AccessPredicate, AccessTarget, Operation};
pub use descriptor::{
    Identity, IdentityKind, ResourceDescriptor, ResourceDescriptorBuilder, RowDefaults, RowFilter,
};
pub use error::{CoreError, CoreResult};
pub use feed::{
    ByteStream, ChangeFeedService, FeedRequest, FeedResponse, MemoryChangeFeed, MemoryFeedConfig,
};
pub use predicate::Predicate;
pub use session::Session;
pub use shape::{FieldKind, FieldSpec, Shape, ValidationError};
pub use store::{ChangeLog, LogEntry, LogHead, MemoryStore, Store, StoreTransaction};

pub use rowsync_sync_protocol::{Row, RowKey, TransactionId};
