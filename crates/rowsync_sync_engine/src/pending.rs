//! Local mutations and their confirmation state machine.

use crate::error::{SyncError, SyncResult};
use rowsync_sync_protocol::{Row, RowKey, TransactionId};
use std::fmt;
use std::time::Instant;

/// Key of a row in the local view.
///
/// Rows inserted locally without an identity value carry a placeholder
/// until the server assigns one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalKey {
    /// Server-assigned identity.
    Synced(RowKey),
    /// Placeholder of a locally inserted row.
    Pending(u64),
}

impl LocalKey {
    /// Returns the server identity, if known.
    pub fn row_key(&self) -> Option<&RowKey> {
        match self {
            LocalKey::Synced(key) => Some(key),
            LocalKey::Pending(_) => None,
        }
    }

    /// Returns true for placeholder keys.
    pub fn is_pending(&self) -> bool {
        matches!(self, LocalKey::Pending(_))
    }
}

impl From<RowKey> for LocalKey {
    fn from(key: RowKey) -> Self {
        LocalKey::Synced(key)
    }
}

impl From<i64> for LocalKey {
    fn from(key: i64) -> Self {
        LocalKey::Synced(RowKey::Int(key))
    }
}

impl From<i32> for LocalKey {
    fn from(key: i32) -> Self {
        LocalKey::Synced(RowKey::Int(i64::from(key)))
    }
}

impl From<&str> for LocalKey {
    fn from(key: &str) -> Self {
        LocalKey::Synced(RowKey::from(key))
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalKey::Synced(key) => write!(f, "{key}"),
            LocalKey::Pending(n) => write!(f, "pending#{n}"),
        }
    }
}

/// Kind of a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Create a row.
    Insert,
    /// Patch a row.
    Update,
    /// Remove a row.
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Insert => "insert",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        })
    }
}

/// A write issued against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Kind of write.
    pub kind: MutationKind,
    /// Resource the write targets.
    pub resource: String,
    /// Row for inserts, patch for updates, empty for deletes.
    pub payload: Row,
    /// Target identity, once known.
    pub key: Option<RowKey>,
}

impl Mutation {
    /// Creates an insert.
    pub fn insert(resource: impl Into<String>, row: Row) -> Self {
        Self {
            kind: MutationKind::Insert,
            resource: resource.into(),
            payload: row,
            key: None,
        }
    }

    /// Creates an update.
    pub fn update(resource: impl Into<String>, key: Option<RowKey>, patch: Row) -> Self {
        Self {
            kind: MutationKind::Update,
            resource: resource.into(),
            payload: patch,
            key,
        }
    }

    /// Creates a delete.
    pub fn delete(resource: impl Into<String>, key: Option<RowKey>) -> Self {
        Self {
            kind: MutationKind::Delete,
            resource: resource.into(),
            payload: Row::new(),
            key,
        }
    }
}

/// Lifecycle of a pending mutation.
///
/// ```text
/// Created ──► Sent ──► Confirmed
///    │          │
///    └──────────┴─────► Rejected
/// ```
///
/// Both terminal states remove the mutation from the pending list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationState {
    /// Applied locally, not yet sent.
    Created,
    /// The gateway call is in flight or answered, awaiting the feed event.
    Sent,
    /// The write was observed on the change feed.
    Confirmed,
    /// The gateway call failed.
    Rejected,
}

impl MutationState {
    /// Returns true for states that end the mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, MutationState::Confirmed | MutationState::Rejected)
    }

    /// Returns true if `to` may follow this state.
    pub fn can_transition_to(self, to: MutationState) -> bool {
        matches!(
            (self, to),
            (MutationState::Created, MutationState::Sent)
                | (MutationState::Created, MutationState::Rejected)
                | (MutationState::Sent, MutationState::Confirmed)
                | (MutationState::Sent, MutationState::Rejected)
        )
    }
}

/// A local mutation awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    /// Collection-unique id, in submission order.
    pub id: u64,
    /// The write.
    pub mutation: Mutation,
    /// Row the overlay applies to.
    pub key: LocalKey,
    /// Current state.
    pub state: MutationState,
    /// When the mutation was applied locally.
    pub submitted_at: Instant,
    /// Transaction reported by the gateway.
    pub transaction_id: Option<TransactionId>,
    /// Row returned by the gateway.
    pub(crate) response: Option<Row>,
}

impl PendingMutation {
    pub(crate) fn new(id: u64, mutation: Mutation, key: LocalKey) -> Self {
        Self {
            id,
            mutation,
            key,
            state: MutationState::Created,
            submitted_at: Instant::now(),
            transaction_id: None,
            response: None,
        }
    }

    /// Moves to a new state.
    pub fn transition(&mut self, to: MutationState) -> SyncResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: format!("{to:?}"),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Applies this mutation's overlay to a view row.
    ///
    /// Returns the row the view should hold afterwards.
    pub(crate) fn overlay(&self, current: Option<Row>) -> Option<Row> {
        match self.mutation.kind {
            MutationKind::Insert => Some(self.mutation.payload.clone()),
            MutationKind::Update => current.map(|mut row| {
                for (column, value) in &self.mutation.payload {
                    row.insert(column.clone(), value.clone());
                }
                row
            }),
            MutationKind::Delete => None,
        }
    }
}
