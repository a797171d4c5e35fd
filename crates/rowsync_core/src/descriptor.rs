//! Resource descriptors.
//!
//! A [`ResourceDescriptor`] is the static contract of one synchronized
//! resource: its table, identity column, payload shapes, access policy and
//! the session-derived row filter and defaults. Descriptors are built
//! explicitly by the integrator and are immutable once built.

use crate::access::AccessPolicy;
use crate::error::{CoreError, CoreResult};
use crate::predicate::Predicate;
use crate::session::Session;
use crate::shape::{Shape, ValidationError};
use rowsync_sync_protocol::{Row, RowKey};
use std::fmt;
use std::sync::Arc;

/// How identity values of a resource are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdentityKind {
    /// Monotonically increasing integers.
    #[default]
    Serial,
    /// Random v4 UUIDs.
    Uuid,
}

/// Identity column of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Column holding the identity value.
    pub column: String,
    /// How values are assigned.
    pub kind: IdentityKind,
}

impl Identity {
    /// Creates an identity spec.
    pub fn new(column: impl Into<String>, kind: IdentityKind) -> Self {
        Self {
            column: column.into(),
            kind,
        }
    }

    /// Parses an identity value from a path segment.
    pub fn parse_key(&self, raw: &str) -> Result<RowKey, ValidationError> {
        match self.kind {
            IdentityKind::Serial => raw
                .parse::<i64>()
                .map(RowKey::Int)
                .map_err(|_| ValidationError::field(&self.column, format!("invalid id `{raw}`"))),
            IdentityKind::Uuid => uuid::Uuid::parse_str(raw)
                .map(|id| RowKey::Text(id.to_string()))
                .map_err(|_| ValidationError::field(&self.column, format!("invalid id `{raw}`"))),
        }
    }

    /// Reads the identity value of a row.
    pub fn key_of(&self, row: &Row) -> Option<RowKey> {
        RowKey::from_row(row, &self.column)
    }

    /// Predicate matching exactly the row with this key.
    pub fn matching(&self, key: &RowKey) -> Predicate {
        Predicate::eq(&self.column, key.to_value())
    }
}

/// Session-derived filter restricting the rows a session may read.
pub type RowFilter = Arc<dyn Fn(&Session) -> Predicate + Send + Sync>;

/// Session-derived defaults stamped onto created rows.
pub type RowDefaults = Arc<dyn Fn(&Session, &mut Row) + Send + Sync>;

/// Static contract of one resource.
#[derive(Clone)]
pub struct ResourceDescriptor {
    name: String,
    table: String,
    identity: Identity,
    select_shape: Shape,
    create_shape: Shape,
    update_shape: Shape,
    policy: AccessPolicy,
    row_filter: Option<RowFilter>,
    row_defaults: Option<RowDefaults>,
    parent_column: Option<String>,
    client_identity: bool,
}

impl ResourceDescriptor {
    /// Starts building a descriptor.
    pub fn builder(
        name: impl Into<String>,
        table: impl Into<String>,
        identity_column: impl Into<String>,
    ) -> ResourceDescriptorBuilder {
        ResourceDescriptorBuilder::new(name.into(), table.into(), identity_column.into())
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Identity column.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Shape applied to outgoing rows.
    pub fn select_shape(&self) -> &Shape {
        &self.select_shape
    }

    /// Shape validating create payloads.
    pub fn create_shape(&self) -> &Shape {
        &self.create_shape
    }

    /// Shape validating update patches.
    pub fn update_shape(&self) -> &Shape {
        &self.update_shape
    }

    /// Access policy.
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Column referencing the parent row, for hierarchical resources.
    pub fn parent_column(&self) -> Option<&str> {
        self.parent_column.as_deref()
    }

    /// Returns true if create payloads may carry their own identity.
    pub fn accepts_client_identity(&self) -> bool {
        self.client_identity
    }

    /// Returns the row filter for a session, if the resource defines one.
    pub fn row_filter_for(&self, session: &Session) -> Option<Predicate> {
        self.row_filter.as_ref().map(|f| f(session))
    }

    /// Applies the session-derived defaults to a new row.
    pub fn apply_defaults(&self, session: &Session, row: &mut Row) {
        if let Some(ref defaults) = self.row_defaults {
            defaults(session, row);
        }
    }
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("identity", &self.identity)
            .field("parent_column", &self.parent_column)
            .field("client_identity", &self.client_identity)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResourceDescriptor`].
pub struct ResourceDescriptorBuilder {
    name: String,
    table: String,
    identity: Identity,
    select_shape: Shape,
    create_shape: Shape,
    update_shape: Option<Shape>,
    policy: AccessPolicy,
    row_filter: Option<RowFilter>,
    row_defaults: Option<RowDefaults>,
    parent_column: Option<String>,
    client_identity: bool,
}

impl ResourceDescriptorBuilder {
    fn new(name: String, table: String, identity_column: String) -> Self {
        Self {
            name,
            table,
            identity: Identity::new(identity_column, IdentityKind::Serial),
            select_shape: Shape::any(),
            create_shape: Shape::any(),
            update_shape: None,
            policy: AccessPolicy::deny_all(),
            row_filter: None,
            row_defaults: None,
            parent_column: None,
            client_identity: false,
        }
    }

    /// Sets how identity values are assigned.
    #[must_use]
    pub fn identity_kind(mut self, kind: IdentityKind) -> Self {
        self.identity.kind = kind;
        self
    }

    /// Sets the shape applied to outgoing rows.
    #[must_use]
    pub fn select_shape(mut self, shape: Shape) -> Self {
        self.select_shape = shape;
        self
    }

    /// Sets the shape validating create payloads.
    #[must_use]
    pub fn create_shape(mut self, shape: Shape) -> Self {
        self.create_shape = shape;
        self
    }

    /// Sets the shape validating update patches.
    ///
    /// Defaults to the create shape, all-optional, without the identity column.
    #[must_use]
    pub fn update_shape(mut self, shape: Shape) -> Self {
        self.update_shape = Some(shape);
        self
    }

    /// Sets the access policy. Defaults to denying every write.
    #[must_use]
    pub fn access_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the session-derived read filter.
    #[must_use]
    pub fn row_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Session) -> Predicate + Send + Sync + 'static,
    {
        self.row_filter = Some(Arc::new(filter));
        self
    }

    /// Sets the session-derived defaults for created rows.
    #[must_use]
    pub fn row_defaults<F>(mut self, defaults: F) -> Self
    where
        F: Fn(&Session, &mut Row) + Send + Sync + 'static,
    {
        self.row_defaults = Some(Arc::new(defaults));
        self
    }

    /// Declares the column referencing the parent row.
    #[must_use]
    pub fn parent_column(mut self, column: impl Into<String>) -> Self {
        self.parent_column = Some(column.into());
        self
    }

    /// Lets create payloads choose their identity value. Off by default:
    /// the store assigns identities.
    #[must_use]
    pub fn client_identity(mut self, allowed: bool) -> Self {
        self.client_identity = allowed;
        self
    }

    /// Validates the configuration and builds the descriptor.
    pub fn build(self) -> CoreResult<ResourceDescriptor> {
        if self.name.is_empty() || self.table.is_empty() || self.identity.column.is_empty() {
            return Err(CoreError::invalid_descriptor(
                "name, table and identity column must be non-empty",
            ));
        }

        let update_shape = self
            .update_shape
            .unwrap_or_else(|| self.create_shape.partial().without(&self.identity.column));

        if update_shape.contains(&self.identity.column) {
            return Err(CoreError::invalid_descriptor(format!(
                "identity column {} cannot be updated",
                self.identity.column
            )));
        }

        if let Some(ref parent) = self.parent_column {
            let declared = self.create_shape.fields().is_empty() || self.create_shape.contains(parent);
            if !declared {
                return Err(CoreError::invalid_descriptor(format!(
                    "parent column {parent} is not part of the create shape"
                )));
            }
        }

        Ok(ResourceDescriptor {
            name: self.name,
            table: self.table,
            identity: self.identity,
            select_shape: self.select_shape,
            create_shape: self.create_shape,
            update_shape,
            policy: self.policy,
            row_filter: self.row_filter,
            row_defaults: self.row_defaults,
            parent_column: self.parent_column,
            client_identity: self.client_identity,
        })
    }
}
