//! Row-level access policies.
//!
//! Each resource carries one access predicate per write operation. A
//! predicate sees the caller's [`Session`] and the data of the proposed
//! write ([`AccessTarget`]) and returns an [`AccessDecision`]. Predicates are
//! pure: they never read or write the store.

use crate::predicate::Predicate;
use crate::session::Session;
use rowsync_sync_protocol::{Row, RowKey};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Write operation an access predicate gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Row creation.
    Create,
    /// Row update.
    Update,
    /// Row deletion.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Update => f.write_str("update"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// Outcome of an access predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    /// The write may proceed unchanged.
    Allow,
    /// The write may proceed, restricted to rows matching the filter.
    AllowWithFilter(Predicate),
    /// The write is refused, with a reason for the caller.
    Deny(String),
}

impl AccessDecision {
    /// Creates a denial.
    pub fn deny(reason: impl Into<String>) -> Self {
        AccessDecision::Deny(reason.into())
    }

    /// Returns true for a denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Deny(_))
    }

    /// Returns the filter the write must be combined with.
    pub fn filter(&self) -> Predicate {
        match self {
            AccessDecision::AllowWithFilter(p) => p.clone(),
            _ => Predicate::True,
        }
    }
}

/// Data an access predicate may inspect.
#[derive(Debug, Clone, Copy)]
pub enum AccessTarget<'a> {
    /// Proposed new row, after defaults have been applied.
    Create {
        /// The row to be inserted.
        row: &'a Row,
    },
    /// Proposed patch of an existing row.
    Update {
        /// Identity of the target row.
        key: &'a RowKey,
        /// Fields to change.
        patch: &'a Row,
    },
    /// Removal of an existing row.
    Delete {
        /// Identity of the target row.
        key: &'a RowKey,
    },
}

impl AccessTarget<'_> {
    /// Returns the operation of this target.
    pub fn operation(&self) -> Operation {
        match self {
            AccessTarget::Create { .. } => Operation::Create,
            AccessTarget::Update { .. } => Operation::Update,
            AccessTarget::Delete { .. } => Operation::Delete,
        }
    }
}

/// An access predicate.
pub type AccessPredicate =
    Arc<dyn Fn(&Session, &AccessTarget<'_>) -> AccessDecision + Send + Sync>;

/// Access predicates for the three write operations of a resource.
#[derive(Clone)]
pub struct AccessPolicy {
    create: AccessPredicate,
    update: AccessPredicate,
    delete: AccessPredicate,
}

impl AccessPolicy {
    /// Creates a policy from three predicates.
    pub fn new<C, U, D>(create: C, update: U, delete: D) -> Self
    where
        C: Fn(&Session, &AccessTarget<'_>) -> AccessDecision + Send + Sync + 'static,
        U: Fn(&Session, &AccessTarget<'_>) -> AccessDecision + Send + Sync + 'static,
        D: Fn(&Session, &AccessTarget<'_>) -> AccessDecision + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            update: Arc::new(update),
            delete: Arc::new(delete),
        }
    }

    /// Allows every write by any session.
    pub fn allow_all() -> Self {
        Self::new(
            |_, _| AccessDecision::Allow,
            |_, _| AccessDecision::Allow,
            |_, _| AccessDecision::Allow,
        )
    }

    /// Denies every write.
    pub fn deny_all() -> Self {
        Self::new(
            |_, _| AccessDecision::deny("resource is read-only"),
            |_, _| AccessDecision::deny("resource is read-only"),
            |_, _| AccessDecision::deny("resource is read-only"),
        )
    }

    /// Restricts writes to rows whose `column` holds the session's user id.
    ///
    /// Creates must stamp the owner column with the caller's id. Updates and
    /// deletes are narrowed to the caller's rows; an update may not move a
    /// row to another owner.
    pub fn owned_by(column: impl Into<String>) -> Self {
        let column: Arc<str> = Arc::from(column.into());
        let (create_col, update_col, delete_col) = (column.clone(), column.clone(), column);

        Self::new(
            move |session, target| match target {
                AccessTarget::Create { row } if owns(row, &create_col, session) => {
                    AccessDecision::Allow
                }
                _ => AccessDecision::deny(format!(
                    "{create_col} must be the creating user"
                )),
            },
            move |session, target| match target {
                AccessTarget::Update { patch, .. }
                    if patch.contains_key(&*update_col) && !owns(patch, &update_col, session) =>
                {
                    AccessDecision::deny(format!("{update_col} cannot be reassigned"))
                }
                _ => AccessDecision::AllowWithFilter(Predicate::eq(
                    &*update_col,
                    session.user_id(),
                )),
            },
            move |session, _| {
                AccessDecision::AllowWithFilter(Predicate::eq(&*delete_col, session.user_id()))
            },
        )
    }

    /// Evaluates the predicate for the target's operation.
    pub fn evaluate(&self, session: &Session, target: &AccessTarget<'_>) -> AccessDecision {
        let predicate = match target.operation() {
            Operation::Create => &self.create,
            Operation::Update => &self.update,
            Operation::Delete => &self.delete,
        };
        predicate(session, target)
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::deny_all()
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy").finish_non_exhaustive()
    }
}

fn owns(row: &Row, column: &str, session: &Session) -> bool {
    matches!(row.get(column), Some(Value::String(owner)) if owner == session.user_id())
}
