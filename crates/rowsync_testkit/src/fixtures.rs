//! Resource fixtures.
//!
//! Provides the two resources used across the test suites: an
//! owner-scoped todo list and a self-referencing folder tree.

use rowsync_core::{
    AccessPolicy, FieldKind, FieldSpec, Predicate, ResourceDescriptor, Session, Shape,
};
use serde_json::{json, Value};

/// Header carrying the user id in tests.
pub const USER_HEADER: &str = "x-user-id";

/// Mount path of the todo resource.
pub const TODOS_PATH: &str = "/api/todos";

/// Mount path of the folder resource.
pub const FOLDERS_PATH: &str = "/api/folders";

/// Creates a session for a user.
pub fn session(user: &str) -> Session {
    Session::new(user)
}

/// Owner-scoped todo resource.
///
/// Rows are `{id, text, completed, user_id}` with a serial `id`. The
/// owner is stamped from the session on create, only the owner may update
/// or delete, and subscriptions only see the session's own rows.
pub fn todo_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::builder("todos", "todos", "id")
        .create_shape(
            Shape::new()
                .required("text", FieldKind::Text)
                .optional("completed", FieldKind::Boolean),
        )
        .select_shape(
            Shape::new()
                .required("id", FieldKind::Integer)
                .required("text", FieldKind::Text)
                .required("completed", FieldKind::Boolean)
                .required("user_id", FieldKind::Text),
        )
        .access_policy(AccessPolicy::owned_by("user_id"))
        .row_defaults(|session, row| {
            row.insert("user_id".into(), Value::from(session.user_id()));
            row.entry("completed").or_insert(Value::Bool(false));
        })
        .row_filter(|session| Predicate::eq("user_id", session.user_id()))
        .build()
        .expect("todo descriptor is valid")
}

/// Self-referencing folder resource.
///
/// Rows are `{id, name, parent_id}`; `parent_id` references another
/// folder or is null. Every session may read and write every folder.
pub fn folder_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::builder("folders", "folders", "id")
        .create_shape(
            Shape::new()
                .required("name", FieldKind::Text)
                .field(FieldSpec::new("parent_id", FieldKind::Integer).optional().nullable()),
        )
        .access_policy(AccessPolicy::allow_all())
        .row_defaults(|_, row| {
            row.entry("parent_id").or_insert(Value::Null);
        })
        .parent_column("parent_id")
        .build()
        .expect("folder descriptor is valid")
}

/// A todo create payload.
pub fn todo(text: &str) -> Value {
    json!({ "text": text, "completed": false })
}

/// A folder create payload.
pub fn folder(name: &str, parent: Option<i64>) -> Value {
    json!({ "name": name, "parent_id": parent })
}
