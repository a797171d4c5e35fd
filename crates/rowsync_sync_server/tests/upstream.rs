//! Subscriptions proxied to an HTTP change-feed service.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rowsync_core::MemoryStore;
use rowsync_sync_server::{HeaderSessionResolver, ServerConfig, SyncServer};
use rowsync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy_router(upstream_url: String) -> Router {
    init_tracing();
    let config = ServerConfig::default()
        .with_upstream_url(upstream_url)
        .with_upstream_param("source_secret", "s3cr3t")
        .with_request_timeout(Duration::from_secs(5));
    SyncServer::builder(config)
        .resolver(Arc::new(HeaderSessionResolver::new(USER_HEADER)))
        .store(Arc::new(MemoryStore::new()))
        .resource(TODOS_PATH, todo_descriptor())
        .build()
        .unwrap()
        .router()
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(USER_HEADER, user)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn forwards_filter_and_streams_body() {
    let upstream = MockServer::start().await;
    let body = r#"[{"type":"up-to-date"}]"#;
    Mock::given(method("GET"))
        .and(path("/v1/shape"))
        .and(query_param("table", "todos"))
        .and(query_param("offset", "-1"))
        .and(query_param("where", r#""user_id" = 'alice'"#))
        .and(query_param("source_secret", "s3cr3t"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("feed-offset", "7")
                .insert_header("feed-handle", "h1")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let router = proxy_router(format!("{}/v1/shape", upstream.uri()));
    let uri = format!("{TODOS_PATH}?offset=-1&table=users&where=true");
    let response = router.oneshot(get(&uri, "alice")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["feed-offset"], "7");
    assert_eq!(response.headers()["feed-handle"], "h1");
    assert!(response.headers().get("content-length").is_none());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], body.as_bytes());
}

#[tokio::test]
async fn upstream_status_is_forwarded() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(409).set_body_string(r#"[{"type":"must-refetch"}]"#))
        .mount(&upstream)
        .await;

    let router = proxy_router(upstream.uri());
    let response = router
        .oneshot(get(&format!("{TODOS_PATH}?offset=3&handle=old"), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let router = proxy_router("http://127.0.0.1:1/v1/shape".to_string());
    let response = router
        .oneshot(get(&format!("{TODOS_PATH}?offset=-1"), "alice"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
