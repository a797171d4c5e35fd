//! Authorized transactional writes.
//!
//! The gateway runs every create, update and delete in one store
//! transaction:
//!
//! 1. resolve the session (Unauthenticated otherwise)
//! 2. validate the payload or identity against the descriptor; create
//!    payloads carry no identity unless the resource opts in
//! 3. evaluate the access predicate; a denial stops before the store is touched
//! 4. write, read the transaction id and commit, or roll back on any failure
//!
//! An `AllowWithFilter` decision narrows updates and deletes to
//! `identity = id AND filter`. When that matches nothing, a row that still
//! exists by identity alone was excluded by the filter (AccessDenied);
//! otherwise the row does not exist (NotFound).

use crate::error::{GatewayError, GatewayResult};
use rowsync_core::{
    AccessDecision, AccessTarget, Predicate, ResourceDescriptor, Session, Store, StoreTransaction,
};
use rowsync_sync_protocol::{MutationResponse, Row, RowKey, TransactionId};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Performs authorized writes against one resource.
pub struct MutationGateway {
    descriptor: Arc<ResourceDescriptor>,
    store: Arc<dyn Store>,
}

impl MutationGateway {
    /// Creates a gateway for a resource.
    pub fn new(descriptor: Arc<ResourceDescriptor>, store: Arc<dyn Store>) -> Self {
        Self { descriptor, store }
    }

    /// Returns the resource descriptor.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Creates a row.
    pub async fn create(
        &self,
        session: Option<&Session>,
        payload: &Value,
    ) -> GatewayResult<MutationResponse> {
        let session = session.ok_or(GatewayError::Unauthenticated)?;
        let d = &self.descriptor;

        let mut row = d.create_shape().validate(payload)?;
        let chosen = row.get(&d.identity().column).is_some_and(|v| !v.is_null());
        if chosen && !d.accepts_client_identity() {
            return Err(GatewayError::Validation(format!(
                "field `{}`: identity is assigned by the server",
                d.identity().column
            )));
        }
        d.apply_defaults(session, &mut row);

        match d.policy().evaluate(session, &AccessTarget::Create { row: &row }) {
            AccessDecision::Deny(reason) => return Err(self.denied("create", session, reason)),
            AccessDecision::AllowWithFilter(filter) if !filter.matches(&row) => {
                return Err(self.denied(
                    "create",
                    session,
                    "row does not satisfy the access filter".to_string(),
                ));
            }
            _ => {}
        }

        let mut tx = self.store.begin().await?;
        let result = self.insert_row(tx.as_mut(), row).await;
        let (item, txid) = finish(tx, result).await?;
        Ok(self.respond("create", txid, item))
    }

    /// Updates the row with identity `id`.
    pub async fn update(
        &self,
        session: Option<&Session>,
        id: &str,
        payload: &Value,
    ) -> GatewayResult<MutationResponse> {
        let session = session.ok_or(GatewayError::Unauthenticated)?;
        let d = &self.descriptor;

        let key = d.identity().parse_key(id)?;
        let patch = d.update_shape().validate(payload)?;
        if patch.contains_key(&d.identity().column) {
            return Err(GatewayError::Validation(format!(
                "field `{}`: identity cannot be changed",
                d.identity().column
            )));
        }

        let decision = d.policy().evaluate(
            session,
            &AccessTarget::Update {
                key: &key,
                patch: &patch,
            },
        );
        let matcher = self.matcher(&key, session, decision, "update")?;

        let mut tx = self.store.begin().await?;
        let result = self.update_row(tx.as_mut(), &key, &matcher, &patch).await;
        let (item, txid) = finish(tx, result).await?;
        Ok(self.respond("update", txid, item))
    }

    /// Deletes the row with identity `id`. The response carries the removed row.
    pub async fn delete(&self, session: Option<&Session>, id: &str) -> GatewayResult<MutationResponse> {
        let session = session.ok_or(GatewayError::Unauthenticated)?;
        let d = &self.descriptor;

        let key = d.identity().parse_key(id)?;
        let decision = d.policy().evaluate(session, &AccessTarget::Delete { key: &key });
        let matcher = self.matcher(&key, session, decision, "delete")?;

        let mut tx = self.store.begin().await?;
        let result = self.delete_row(tx.as_mut(), &key, &matcher).await;
        let (item, txid) = finish(tx, result).await?;
        Ok(self.respond("delete", txid, item))
    }

    fn matcher(
        &self,
        key: &RowKey,
        session: &Session,
        decision: AccessDecision,
        operation: &str,
    ) -> GatewayResult<Predicate> {
        match decision {
            AccessDecision::Deny(reason) => Err(self.denied(operation, session, reason)),
            decision => Ok(self.descriptor.identity().matching(key).and(decision.filter())),
        }
    }

    async fn insert_row(
        &self,
        tx: &mut dyn StoreTransaction,
        row: Row,
    ) -> GatewayResult<(Row, TransactionId)> {
        let d = &self.descriptor;
        let item = tx.insert(d.table(), d.identity(), row).await?;

        if let Some(parent) = d.parent_column() {
            if let (Some(key), Some(new_parent)) = (d.identity().key_of(&item), item.get(parent)) {
                self.check_hierarchy(tx, &key, parent, new_parent).await?;
            }
        }

        let txid = tx.transaction_id().await?;
        Ok((item, txid))
    }

    async fn update_row(
        &self,
        tx: &mut dyn StoreTransaction,
        key: &RowKey,
        matcher: &Predicate,
        patch: &Row,
    ) -> GatewayResult<(Row, TransactionId)> {
        let d = &self.descriptor;
        let Some(item) = tx.update(d.table(), matcher, patch).await?.into_iter().next() else {
            return Err(self.missing(tx, key).await);
        };

        if let Some(parent) = d.parent_column() {
            if let Some(new_parent) = patch.get(parent) {
                self.check_hierarchy(tx, key, parent, new_parent).await?;
            }
        }

        let txid = tx.transaction_id().await?;
        Ok((item, txid))
    }

    async fn delete_row(
        &self,
        tx: &mut dyn StoreTransaction,
        key: &RowKey,
        matcher: &Predicate,
    ) -> GatewayResult<(Row, TransactionId)> {
        let Some(item) = tx
            .delete(self.descriptor.table(), matcher)
            .await?
            .into_iter()
            .next()
        else {
            return Err(self.missing(tx, key).await);
        };

        let txid = tx.transaction_id().await?;
        Ok((item, txid))
    }

    // Walks the ancestor chain starting at the new parent. The row has
    // already been written, so reaching it again means a cycle.
    async fn check_hierarchy(
        &self,
        tx: &mut dyn StoreTransaction,
        key: &RowKey,
        parent: &str,
        new_parent: &Value,
    ) -> GatewayResult<()> {
        let d = &self.descriptor;
        let mut visited = HashSet::new();
        let mut current = RowKey::from_value(new_parent);

        while let Some(ancestor) = current {
            if ancestor == *key {
                return Err(cycle_error(parent));
            }
            if !visited.insert(ancestor.clone()) {
                break;
            }
            let rows = tx
                .select(d.table(), &d.identity().matching(&ancestor))
                .await?;
            current = rows
                .first()
                .and_then(|row| row.get(parent))
                .and_then(RowKey::from_value);
        }
        Ok(())
    }

    async fn missing(&self, tx: &mut dyn StoreTransaction, key: &RowKey) -> GatewayError {
        let d = &self.descriptor;
        match tx.select(d.table(), &d.identity().matching(key)).await {
            Ok(rows) if !rows.is_empty() => {
                GatewayError::AccessDenied(format!("{} {key} is not accessible", d.name()))
            }
            Ok(_) => GatewayError::NotFound(format!("{} {key} not found", d.name())),
            Err(err) => err.into(),
        }
    }

    fn denied(&self, operation: &str, session: &Session, reason: String) -> GatewayError {
        tracing::debug!(
            resource = self.descriptor.name(),
            operation,
            user = session.user_id(),
            %reason,
            "write denied"
        );
        GatewayError::AccessDenied(reason)
    }

    fn respond(&self, operation: &str, txid: TransactionId, item: Row) -> MutationResponse {
        let d = &self.descriptor;
        tracing::debug!(
            resource = d.name(),
            operation,
            key = ?d.identity().key_of(&item),
            %txid,
            "write committed"
        );
        MutationResponse::new(txid, d.select_shape().project(&item))
    }
}

impl std::fmt::Debug for MutationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGateway")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn cycle_error(parent: &str) -> GatewayError {
    GatewayError::Validation(format!(
        "field `{parent}`: a row cannot be its own ancestor"
    ))
}

async fn finish<T>(tx: Box<dyn StoreTransaction>, result: GatewayResult<T>) -> GatewayResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|err| {
                tracing::warn!(error = %err, "commit failed");
                GatewayError::from(err)
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_core::{AccessPolicy, FieldKind, FieldSpec, MemoryStore, Shape};
    use serde_json::json;

    fn todos() -> Arc<ResourceDescriptor> {
        let descriptor = ResourceDescriptor::builder("todos", "todos", "id")
            .create_shape(
                Shape::new()
                    .required("text", FieldKind::Text)
                    .optional("completed", FieldKind::Boolean),
            )
            .select_shape(
                Shape::new()
                    .required("id", FieldKind::Integer)
                    .required("text", FieldKind::Text)
                    .optional("completed", FieldKind::Boolean)
                    .required("user_id", FieldKind::Text),
            )
            .access_policy(AccessPolicy::owned_by("user_id"))
            .row_defaults(|session, row| {
                row.insert("user_id".into(), Value::from(session.user_id()));
                row.entry("completed").or_insert(Value::Bool(false));
            })
            .build()
            .unwrap();
        Arc::new(descriptor)
    }

    fn folders() -> Arc<ResourceDescriptor> {
        let descriptor = ResourceDescriptor::builder("folders", "folders", "id")
            .create_shape(
                Shape::new()
                    .required("name", FieldKind::Text)
                    .field(FieldSpec::new("parent_id", FieldKind::Integer).optional().nullable()),
            )
            .access_policy(AccessPolicy::allow_all())
            .parent_column("parent_id")
            .build()
            .unwrap();
        Arc::new(descriptor)
    }

    fn gateway(descriptor: Arc<ResourceDescriptor>) -> (MutationGateway, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (MutationGateway::new(descriptor, store.clone()), store)
    }

    fn alice() -> Session {
        Session::new("alice")
    }

    #[tokio::test]
    async fn create_returns_transaction_and_projected_item() {
        let (gw, store) = gateway(todos());
        let response = gw
            .create(Some(&alice()), &json!({"text": "buy milk", "completed": false}))
            .await
            .unwrap();

        assert_eq!(response.item["text"], "buy milk");
        assert_eq!(response.item["user_id"], "alice");
        assert_eq!(response.item["completed"], false);
        assert!(response.item.contains_key("id"));

        let entries = store.log().poll(0, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_id, response.transaction_id);
    }

    #[tokio::test]
    async fn created_identities_are_unique() {
        let (gw, _) = gateway(todos());
        let mut ids = HashSet::new();
        for i in 0..5 {
            let response = gw
                .create(Some(&alice()), &json!({"text": format!("todo {i}")}))
                .await
                .unwrap();
            assert!(ids.insert(response.item["id"].as_i64().unwrap()));
        }
    }

    #[tokio::test]
    async fn unauthenticated_writes_are_rejected() {
        let (gw, store) = gateway(todos());
        let err = gw.create(None, &json!({"text": "x"})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated));
        assert_eq!(store.count("todos").await, 0);
    }

    #[tokio::test]
    async fn invalid_payloads_are_rejected() {
        let (gw, _) = gateway(todos());
        let err = gw
            .create(Some(&alice()), &json!({"completed": "yes"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let err = gw.update(Some(&alice()), "abc", &json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn non_owner_update_is_denied_without_side_effects() {
        let (gw, store) = gateway(todos());
        let created = gw
            .create(Some(&alice()), &json!({"text": "buy milk"}))
            .await
            .unwrap();
        let id = created.item["id"].to_string();
        let offset = store.log().latest_offset();

        let err = gw
            .update(Some(&Session::new("bob")), &id, &json!({"completed": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));

        let row = store.get("todos", &RowKey::Int(1)).await.unwrap();
        assert_eq!(row["completed"], false);
        assert_eq!(store.log().latest_offset(), offset);
    }

    #[tokio::test]
    async fn update_returns_new_row_and_matching_transaction() {
        let (gw, store) = gateway(todos());
        gw.create(Some(&alice()), &json!({"text": "buy milk"})).await.unwrap();

        let response = gw
            .update(Some(&alice()), "1", &json!({"completed": true}))
            .await
            .unwrap();
        assert_eq!(response.item["completed"], true);

        let entries = store.log().poll(1, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_id, response.transaction_id);
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let (gw, _) = gateway(todos());
        gw.create(Some(&alice()), &json!({"text": "keep"})).await.unwrap();

        let err = gw
            .update(Some(&alice()), "99", &json!({"completed": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));

        let err = gw.delete(Some(&alice()), "99").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_twice() {
        let (gw, store) = gateway(todos());
        gw.create(Some(&alice()), &json!({"text": "x"})).await.unwrap();

        let response = gw.delete(Some(&alice()), "1").await.unwrap();
        assert_eq!(response.item["text"], "x");
        assert_eq!(store.count("todos").await, 0);

        let err = gw.delete(Some(&alice()), "1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn identity_cannot_be_patched() {
        let descriptor = ResourceDescriptor::builder("notes", "notes", "id")
            .access_policy(AccessPolicy::allow_all())
            .build()
            .unwrap();
        let (gw, _) = gateway(Arc::new(descriptor));
        gw.create(Some(&alice()), &json!({"body": "x"})).await.unwrap();

        let err = gw
            .update(Some(&alice()), "1", &json!({"id": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn hierarchy_cycles_are_rejected() {
        let (gw, store) = gateway(folders());
        let session = alice();
        gw.create(Some(&session), &json!({"name": "root"})).await.unwrap();
        gw.create(Some(&session), &json!({"name": "child", "parent_id": 1}))
            .await
            .unwrap();
        gw.create(Some(&session), &json!({"name": "grandchild", "parent_id": 2}))
            .await
            .unwrap();

        let err = gw
            .update(Some(&session), "1", &json!({"parent_id": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let err = gw
            .update(Some(&session), "2", &json!({"parent_id": 2}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));

        let root = store.get("folders", &RowKey::Int(1)).await.unwrap();
        assert!(root.get("parent_id").map_or(true, Value::is_null));

        let moved = gw
            .update(Some(&session), "3", &json!({"parent_id": 1}))
            .await
            .unwrap();
        assert_eq!(moved.item["parent_id"], 1);
    }

    fn named_folders() -> Arc<ResourceDescriptor> {
        let descriptor = ResourceDescriptor::builder("folders", "folders", "id")
            .create_shape(
                Shape::new()
                    .optional("id", FieldKind::Integer)
                    .required("name", FieldKind::Text)
                    .field(FieldSpec::new("parent_id", FieldKind::Integer).optional().nullable()),
            )
            .access_policy(AccessPolicy::allow_all())
            .parent_column("parent_id")
            .client_identity(true)
            .build()
            .unwrap();
        Arc::new(descriptor)
    }

    #[tokio::test]
    async fn created_rows_cannot_choose_their_identity() {
        let descriptor = ResourceDescriptor::builder("notes", "notes", "id")
            .access_policy(AccessPolicy::allow_all())
            .build()
            .unwrap();
        let (gw, store) = gateway(Arc::new(descriptor));
        gw.create(Some(&alice()), &json!({"body": "x"})).await.unwrap();
        gw.delete(Some(&alice()), "1").await.unwrap();

        let err = gw
            .create(Some(&alice()), &json!({"id": 1, "body": "again"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(store.count("notes").await, 0);

        let created = gw
            .create(Some(&alice()), &json!({"id": null, "body": "fresh"}))
            .await
            .unwrap();
        assert_eq!(created.item["id"], 2);
    }

    #[tokio::test]
    async fn chosen_identities_of_deleted_rows_stay_retired() {
        let (gw, store) = gateway(named_folders());
        let session = alice();
        gw.create(Some(&session), &json!({"id": 7, "name": "a"})).await.unwrap();
        gw.delete(Some(&session), "7").await.unwrap();
        let offset = store.log().latest_offset();

        let err = gw
            .create(Some(&session), &json!({"id": 7, "name": "b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(store.count("folders").await, 0);
        assert_eq!(store.log().latest_offset(), offset);
    }

    #[tokio::test]
    async fn inserts_cannot_close_a_cycle() {
        let (gw, store) = gateway(named_folders());
        let session = alice();
        gw.create(Some(&session), &json!({"id": 1, "name": "a", "parent_id": 2}))
            .await
            .unwrap();

        let err = gw
            .create(Some(&session), &json!({"id": 2, "name": "b", "parent_id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert!(store.get("folders", &RowKey::Int(2)).await.is_none());

        let err = gw
            .create(Some(&session), &json!({"id": 3, "name": "c", "parent_id": 3}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(store.count("folders").await, 1);
    }
}
