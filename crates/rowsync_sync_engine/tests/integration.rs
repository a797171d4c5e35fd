//! End-to-end tests of synced collections against a live sync server.

use rowsync_core::RowKey;
use rowsync_sync_engine::{
    CollectionConfig, LocalKey, RetryConfig, SyncError, SyncedCollection,
};
use rowsync_sync_protocol::{ErrorKind, Row};
use rowsync_testkit::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn todos(server: &TestServer, user: &str) -> SyncedCollection {
    let config = CollectionConfig::new(server.base_url(), TODOS_PATH)
        .with_header(USER_HEADER, user)
        .with_retry(RetryConfig::new(2).with_initial_delay(Duration::from_millis(10)));
    SyncedCollection::http(config).unwrap()
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn insert_is_confirmed_through_the_feed() {
    init_tracing();
    let server = TestServer::start().await;
    let alice = todos(&server, "alice");
    timeout(WAIT, alice.preload()).await.unwrap().unwrap();
    assert!(alice.is_empty());

    let handle = alice.insert(row(todo("buy milk")));
    let placeholder = handle.key().clone();
    assert!(placeholder.is_pending());
    assert_eq!(alice.get(placeholder.clone()).unwrap()["text"], "buy milk");

    let confirmed = timeout(WAIT, handle).await.unwrap().unwrap();
    let id = RowKey::from_row(&confirmed, "id").unwrap();
    assert_eq!(confirmed["user_id"], "alice");
    assert_eq!(confirmed["completed"], false);

    assert!(alice.pending().is_empty());
    assert_eq!(alice.rows().len(), 1);
    assert_eq!(alice.get(LocalKey::Synced(id.clone())), Some(confirmed.clone()));
    assert_eq!(alice.get(placeholder), Some(confirmed));
    assert!(server.store().get("todos", &id).await.is_some());
}

#[tokio::test]
async fn update_and_delete_round_trip() {
    init_tracing();
    let server = TestServer::start().await;
    let alice = todos(&server, "alice");
    timeout(WAIT, alice.preload()).await.unwrap().unwrap();

    let created = timeout(WAIT, alice.insert(row(todo("a")))).await.unwrap().unwrap();
    let id = RowKey::from_row(&created, "id").unwrap();

    let updated = timeout(WAIT, alice.update(id.clone(), row(json!({"completed": true}))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["completed"], true);
    assert_eq!(updated["text"], "a");
    assert_eq!(alice.get(id.clone()).unwrap()["completed"], true);

    timeout(WAIT, alice.delete(id.clone())).await.unwrap().unwrap();
    assert!(alice.is_empty());
    assert!(server.store().get("todos", &id).await.is_none());
}

#[tokio::test]
async fn chained_mutations_on_a_pending_insert() {
    init_tracing();
    let server = TestServer::start().await;
    let alice = todos(&server, "alice");
    timeout(WAIT, alice.preload()).await.unwrap().unwrap();

    let insert = alice.insert(row(todo("draft")));
    let update = alice.update(insert.key().clone(), row(json!({"text": "final"})));
    assert_eq!(alice.get(insert.key().clone()).unwrap()["text"], "final");

    timeout(WAIT, insert).await.unwrap().unwrap();
    let updated = timeout(WAIT, update).await.unwrap().unwrap();
    assert_eq!(updated["text"], "final");

    let rows = alice.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].1["text"], "final");
}

#[tokio::test]
async fn rejected_insert_rolls_back() {
    init_tracing();
    let server = TestServer::start().await;
    let alice = todos(&server, "alice");
    timeout(WAIT, alice.preload()).await.unwrap().unwrap();

    let handle = alice.insert(row(json!({"completed": true})));
    assert_eq!(alice.len(), 1);

    let err = timeout(WAIT, handle).await.unwrap().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Validation));
    assert!(alice.is_empty());
    assert_eq!(server.store().count("todos").await, 0);
}

#[tokio::test]
async fn other_users_rows_stay_invisible() {
    init_tracing();
    let server = TestServer::start().await;
    let alice = todos(&server, "alice");
    let bob = todos(&server, "bob");
    timeout(WAIT, alice.preload()).await.unwrap().unwrap();
    timeout(WAIT, bob.preload()).await.unwrap().unwrap();

    let created = timeout(WAIT, alice.insert(row(todo("secret")))).await.unwrap().unwrap();
    let id = RowKey::from_row(&created, "id").unwrap();

    let err = timeout(WAIT, bob.update(id.clone(), row(json!({"text": "mine now"}))))
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.kind().is_some());
    assert!(bob.get(id.clone()).is_none());
    assert_eq!(server.store().get("todos", &id).await.unwrap()["text"], "secret");
    assert!(bob.is_empty());
}

#[tokio::test]
async fn second_collection_observes_writes() {
    init_tracing();
    let server = TestServer::start().await;
    let writer = todos(&server, "alice");
    let reader = todos(&server, "alice");
    timeout(WAIT, writer.preload()).await.unwrap().unwrap();
    timeout(WAIT, reader.preload()).await.unwrap().unwrap();

    timeout(WAIT, writer.insert(row(todo("shared")))).await.unwrap().unwrap();
    wait_until(|| reader.len() == 1).await;
    assert_eq!(reader.rows()[0].1["text"], "shared");
}

#[tokio::test]
async fn preload_sees_existing_rows() {
    init_tracing();
    let server = TestServer::start().await;
    let first = todos(&server, "alice");
    timeout(WAIT, first.preload()).await.unwrap().unwrap();
    timeout(WAIT, first.insert(row(todo("one")))).await.unwrap().unwrap();
    timeout(WAIT, first.insert(row(todo("two")))).await.unwrap().unwrap();
    first.close();

    let later = todos(&server, "alice");
    timeout(WAIT, later.preload()).await.unwrap().unwrap();
    assert_eq!(later.len(), 2);
}

#[tokio::test]
async fn missing_session_fails_preload() {
    init_tracing();
    let server = TestServer::start().await;
    let config = CollectionConfig::new(server.base_url(), TODOS_PATH)
        .with_retry(RetryConfig::no_retry());
    let anonymous = SyncedCollection::http(config).unwrap();

    let err = timeout(WAIT, anonymous.preload()).await.unwrap().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Unauthenticated));
    assert!(!anonymous.is_ready());
    assert!(matches!(anonymous.last_error(), Some(SyncError::Rejected { .. })));
}
