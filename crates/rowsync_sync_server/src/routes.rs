//! axum handlers for one resource.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::MutationGateway;
use crate::proxy::ChangeFeedProxy;
use crate::session::SessionResolver;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use bytes::Bytes;
use rowsync_core::{FeedResponse, Session};
use rowsync_sync_protocol::MutationResponse;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct ResourceState {
    pub(crate) gateway: Arc<MutationGateway>,
    pub(crate) proxy: Arc<ChangeFeedProxy>,
    pub(crate) resolver: Arc<dyn SessionResolver>,
}

/// Routes of one resource mounted at `base_path`.
pub(crate) fn resource_router(base_path: &str, state: ResourceState) -> Router {
    let base = base_path.trim_end_matches('/');
    Router::new()
        .route(base, get(subscribe).post(create))
        .route(&format!("{base}/{{id}}"), put(update).delete(remove))
        .with_state(state)
}

async fn session(state: &ResourceState, headers: &HeaderMap) -> GatewayResult<Session> {
    state
        .resolver
        .resolve(headers)
        .await
        .ok_or(GatewayError::Unauthenticated)
}

fn parse_body(body: &Bytes) -> GatewayResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::Validation(format!("malformed JSON body: {e}")))
}

async fn subscribe(
    State(state): State<ResourceState>,
    headers: HeaderMap,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> GatewayResult<Response> {
    // Anonymous callers learn nothing about their parameters.
    let session = session(&state, &headers).await?;
    let Query(query) = query.map_err(|e| GatewayError::BadRequest(format!("malformed query: {e}")))?;
    let feed = state.proxy.subscribe(Some(&session), query).await?;
    Ok(stream_response(feed))
}

async fn create(
    State(state): State<ResourceState>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<Json<MutationResponse>> {
    let session = session(&state, &headers).await?;
    let payload = parse_body(&body)?;
    Ok(Json(state.gateway.create(Some(&session), &payload).await?))
}

async fn update(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> GatewayResult<Json<MutationResponse>> {
    let session = session(&state, &headers).await?;
    let payload = parse_body(&body)?;
    Ok(Json(state.gateway.update(Some(&session), &id, &payload).await?))
}

async fn remove(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> GatewayResult<Json<MutationResponse>> {
    let session = session(&state, &headers).await?;
    Ok(Json(state.gateway.delete(Some(&session), &id).await?))
}

fn stream_response(feed: FeedResponse) -> Response {
    let status = StatusCode::from_u16(feed.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &feed.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from_stream(feed.body))
        .unwrap_or_else(|e| GatewayError::Upstream(format!("invalid upstream response: {e}")).into_response())
}
