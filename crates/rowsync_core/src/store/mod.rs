//! Transactional store interface.
//!
//! The gateway performs every write through one [`StoreTransaction`]: the
//! write, the read of the transaction id and the commit succeed or fail
//! together. A transaction dropped without commit is rolled back.

mod log;
mod memory;

pub use log::{ChangeLog, LogEntry, LogHead};
pub use memory::MemoryStore;

use crate::descriptor::Identity;
use crate::error::CoreResult;
use crate::predicate::Predicate;
use async_trait::async_trait;
use rowsync_sync_protocol::{Row, TransactionId};

/// A relational store that can open write transactions.
#[async_trait]
pub trait Store: Send + Sync {
    /// Begins a write transaction.
    async fn begin(&self) -> CoreResult<Box<dyn StoreTransaction>>;
}

/// An open write transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts a row, assigning its identity value if absent.
    ///
    /// Returns the stored row.
    async fn insert(&mut self, table: &str, identity: &Identity, row: Row) -> CoreResult<Row>;

    /// Merges `patch` into every row matching `matcher`.
    ///
    /// Returns the updated rows.
    async fn update(&mut self, table: &str, matcher: &Predicate, patch: &Row)
        -> CoreResult<Vec<Row>>;

    /// Removes every row matching `matcher`.
    ///
    /// Returns the removed rows.
    async fn delete(&mut self, table: &str, matcher: &Predicate) -> CoreResult<Vec<Row>>;

    /// Reads every row matching `matcher`.
    async fn select(&mut self, table: &str, matcher: &Predicate) -> CoreResult<Vec<Row>>;

    /// Returns the id this transaction commits under.
    async fn transaction_id(&mut self) -> CoreResult<TransactionId>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> CoreResult<()>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}
