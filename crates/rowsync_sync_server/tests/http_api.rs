//! Router-level tests for the mutation and subscription endpoints.

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use rowsync_core::{MemoryStore, RowKey};
use rowsync_sync_protocol::{
    FeedBatch, FeedMessage, MutationResponse, FEED_CURSOR_HEADER, FEED_HANDLE_HEADER,
    FEED_OFFSET_HEADER,
};
use rowsync_testkit::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn mutation(&self) -> MutationResponse {
        assert_eq!(self.status, StatusCode::OK, "body: {:?}", self.body);
        serde_json::from_slice(&self.body).unwrap()
    }

    fn batch(&self) -> FeedBatch {
        let header = |name: &str| self.headers.get(name).and_then(|v| v.to_str().ok());
        FeedBatch::decode(
            &self.body,
            header(FEED_HANDLE_HEADER),
            header(FEED_OFFSET_HEADER),
            header(FEED_CURSOR_HEADER),
        )
        .unwrap()
    }
}

fn router() -> (Router, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    (build_server(Arc::clone(&store)).router(), store)
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Body>,
) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(USER_HEADER, user);
    }
    let request = request.body(body.unwrap_or_else(Body::empty)).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        body,
    }
}

fn json_body(value: &Value) -> Option<Body> {
    Some(Body::from(serde_json::to_vec(value).unwrap()))
}

async fn create_todo(router: &Router, user: &str, text: &str) -> MutationResponse {
    send(router, Method::POST, TODOS_PATH, Some(user), json_body(&todo(text)))
        .await
        .mutation()
}

fn id_of(response: &MutationResponse) -> String {
    RowKey::from_row(&response.item, "id").unwrap().to_string()
}

fn changes(batch: &FeedBatch) -> Vec<&rowsync_sync_protocol::ChangeEvent> {
    batch
        .messages
        .iter()
        .filter_map(|m| match m {
            FeedMessage::Change(event) => Some(event),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn create_returns_projected_item_and_transaction_id() {
    let (router, _) = router();
    let reply = send(
        &router,
        Method::POST,
        TODOS_PATH,
        Some("alice"),
        json_body(&json!({ "text": "buy milk", "completed": false })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::OK);
    let body = reply.json();
    assert!(body["transactionId"].is_string());
    assert_eq!(body["item"]["text"], "buy milk");
    assert_eq!(body["item"]["completed"], false);
    assert_eq!(body["item"]["user_id"], "alice");
    assert!(body["item"]["id"].is_i64());
}

#[tokio::test]
async fn other_sessions_never_observe_the_row() {
    let (router, _) = router();
    create_todo(&router, "alice", "buy milk").await;

    let uri = format!("{TODOS_PATH}?offset=-1");
    let bob = send(&router, Method::GET, &uri, Some("bob"), None).await;
    assert_eq!(bob.status, StatusCode::OK);
    let batch = bob.batch();
    assert!(changes(&batch).is_empty());
    assert!(batch.is_up_to_date());

    let alice = send(&router, Method::GET, &uri, Some("alice"), None).await.batch();
    assert_eq!(changes(&alice).len(), 1);
    assert!(alice.handle.is_some());
}

#[tokio::test]
async fn client_supplied_filters_are_ignored() {
    let (router, _) = router();
    create_todo(&router, "alice", "secret").await;

    let uri = format!("{TODOS_PATH}?offset=-1&where=true&table=todos");
    let reply = send(&router, Method::GET, &uri, Some("bob"), None).await;
    assert!(changes(&reply.batch()).is_empty());
}

#[tokio::test]
async fn feed_transaction_id_matches_mutation_response() {
    let (router, _) = router();
    let snapshot = send(
        &router,
        Method::GET,
        &format!("{TODOS_PATH}?offset=-1"),
        Some("alice"),
        None,
    )
    .await
    .batch();
    let handle = snapshot.handle.unwrap();
    let offset = snapshot.offset.unwrap();

    let created = create_todo(&router, "alice", "buy milk").await;

    let uri = format!("{TODOS_PATH}?offset={offset}&handle={handle}");
    let batch = send(&router, Method::GET, &uri, Some("alice"), None).await.batch();
    let events = changes(&batch);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].transaction_id, Some(created.transaction_id));
}

#[tokio::test]
async fn stale_handles_must_refetch() {
    let (router, _) = router();
    let uri = format!("{TODOS_PATH}?offset=0&handle=not-a-handle");
    let reply = send(&router, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(reply.batch().must_refetch());
}

#[tokio::test]
async fn non_owner_update_is_forbidden_and_changes_nothing() {
    let (router, store) = router();
    let created = create_todo(&router, "alice", "buy milk").await;
    let id = id_of(&created);
    let log_len = store.log().len();

    let reply = send(
        &router,
        Method::PUT,
        &format!("{TODOS_PATH}/{id}"),
        Some("bob"),
        json_body(&json!({ "completed": true })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.json()["kind"], "access_denied");
    assert_eq!(store.log().len(), log_len);

    let row = store.get("todos", &RowKey::from_row(&created.item, "id").unwrap()).await.unwrap();
    assert_eq!(row["completed"], false);
}

#[tokio::test]
async fn owner_update_returns_new_row() {
    let (router, _) = router();
    let created = create_todo(&router, "alice", "buy milk").await;
    let id = id_of(&created);

    let updated = send(
        &router,
        Method::PUT,
        &format!("{TODOS_PATH}/{id}"),
        Some("alice"),
        json_body(&json!({ "completed": true })),
    )
    .await
    .mutation();

    assert_eq!(updated.item["completed"], true);
    assert!(updated.transaction_id > created.transaction_id);
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let (router, _) = router();
    let created = create_todo(&router, "alice", "buy milk").await;
    let uri = format!("{TODOS_PATH}/{}", id_of(&created));

    let first = send(&router, Method::DELETE, &uri, Some("alice"), None).await.mutation();
    assert_eq!(first.item["text"], "buy milk");

    let second = send(&router, Method::DELETE, &uri, Some("alice"), None).await;
    assert_eq!(second.status, StatusCode::NOT_FOUND);
    assert_eq!(second.json()["kind"], "not_found");
}

#[tokio::test]
async fn requests_without_session_are_unauthenticated() {
    let (router, store) = router();

    let create = send(&router, Method::POST, TODOS_PATH, None, json_body(&todo("x"))).await;
    assert_eq!(create.status, StatusCode::UNAUTHORIZED);
    assert_eq!(create.json()["kind"], "unauthenticated");

    let subscribe = send(&router, Method::GET, &format!("{TODOS_PATH}?offset=-1"), None, None).await;
    assert_eq!(subscribe.status, StatusCode::UNAUTHORIZED);
    assert_eq!(store.count("todos").await, 0);
}

#[tokio::test]
async fn session_is_checked_before_feed_parameters() {
    let (router, _) = router();
    let uri = format!("{TODOS_PATH}?offset=soon&live=maybe");

    let anonymous = send(&router, Method::GET, &uri, None, None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.json()["kind"], "unauthenticated");

    let alice = send(&router, Method::GET, &uri, Some("alice"), None).await;
    assert_eq!(alice.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_bodies_are_validation_errors() {
    let (router, _) = router();

    let reply = send(
        &router,
        Method::POST,
        TODOS_PATH,
        Some("alice"),
        Some(Body::from("{not json")),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.json()["kind"], "validation");

    let reply = send(
        &router,
        Method::POST,
        TODOS_PATH,
        Some("alice"),
        json_body(&json!({ "completed": "yes" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn malformed_ids_are_validation_errors() {
    let (router, _) = router();
    let reply = send(
        &router,
        Method::PUT,
        &format!("{TODOS_PATH}/not-a-number"),
        Some("alice"),
        json_body(&json!({ "completed": true })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn folder_cycles_are_rejected() {
    let (router, _) = router();
    let root = send(
        &router,
        Method::POST,
        FOLDERS_PATH,
        Some("alice"),
        json_body(&folder("root", None)),
    )
    .await
    .mutation();
    let root_id = root.item["id"].as_i64().unwrap();

    let child = send(
        &router,
        Method::POST,
        FOLDERS_PATH,
        Some("alice"),
        json_body(&folder("child", Some(root_id))),
    )
    .await
    .mutation();
    let child_id = child.item["id"].as_i64().unwrap();

    let reply = send(
        &router,
        Method::PUT,
        &format!("{FOLDERS_PATH}/{root_id}"),
        Some("alice"),
        json_body(&json!({ "parent_id": child_id })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);

    let moved = send(
        &router,
        Method::PUT,
        &format!("{FOLDERS_PATH}/{child_id}"),
        Some("alice"),
        json_body(&json!({ "parent_id": null })),
    )
    .await;
    assert_eq!(moved.status, StatusCode::OK);
}
