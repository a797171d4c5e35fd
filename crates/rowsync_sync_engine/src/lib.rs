//! # rowsync Sync Engine
//!
//! Client-side synced collections for rowsync.
//!
//! This crate provides:
//! - `SyncedCollection`: an optimistic local view of one resource kept in
//!   sync through the change-feed proxy
//! - Mutation state machine (created → sent → confirmed | rejected)
//! - Transaction-id reconciliation between mutation responses and feed events
//! - Retry with exponential backoff for the feed
//! - HTTP transport and a scripted mock transport
//!
//! ## Architecture
//!
//! Writes go to the mutation gateway, reads come from the change feed:
//! 1. A write is applied to the local view and sent in the background
//! 2. The gateway answers with the committing transaction id
//! 3. The feed event carrying that id confirms the write
//!
//! ## Key Invariants
//!
//! - The change feed is authoritative
//! - A mutation is never confirmed before its own transaction is observed
//!   in the feed, or covered by an up-to-date feed position
//! - A rejected mutation leaves no trace in the view
//! - Calls touching the same row reach the gateway in submission order

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod error;
mod http;
mod pending;
mod transport;

pub use collection::{MutationHandle, SyncedCollection, ViewChange};
pub use config::{CollectionConfig, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use http::HttpTransport;
pub use pending::{LocalKey, Mutation, MutationKind, MutationState, PendingMutation};
pub use transport::{CollectionTransport, MockCall, MockTransport};
