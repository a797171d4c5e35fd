//! HTTP transport implementation.
//!
//! Talks to a rowsync sync server with `reqwest`:
//!
//! | Call | Request |
//! |---|---|
//! | create | `POST {resource}` |
//! | update | `PUT {resource}/{id}` |
//! | delete | `DELETE {resource}/{id}` |
//! | poll | `GET {resource}?offset=..&handle=..&live=..` |

use crate::config::CollectionConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::CollectionTransport;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use rowsync_sync_protocol::{
    ErrorBody, ErrorKind, FeedBatch, MutationResponse, Row, RowKey, SubscriptionParams,
    FEED_COVERS_HEADER, FEED_CURSOR_HEADER, FEED_HANDLE_HEADER, FEED_OFFSET_HEADER,
};

/// HTTP-based collection transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    /// Creates a transport from a collection configuration.
    pub fn new(config: &CollectionConfig) -> SyncResult<Self> {
        let url = Url::parse(&config.resource_url())
            .map_err(|e| SyncError::transport_fatal(format!("invalid resource URL: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SyncError::transport_fatal(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SyncError::transport_fatal(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    /// Returns the resource URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn row_url(&self, key: &RowKey) -> SyncResult<Url> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::transport_fatal("resource URL cannot have a path"))?
            .pop_if_empty()
            .push(&key.to_string());
        Ok(url)
    }

    async fn mutate(&self, request: RequestBuilder) -> SyncResult<MutationResponse> {
        let response = request.send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        response
            .json::<MutationResponse>()
            .await
            .map_err(|e| SyncError::Protocol(format!("invalid mutation response: {e}")))
    }
}

#[async_trait]
impl CollectionTransport for HttpTransport {
    async fn create(&self, row: &Row) -> SyncResult<MutationResponse> {
        self.mutate(self.client.post(self.url.clone()).json(row)).await
    }

    async fn update(&self, key: &RowKey, patch: &Row) -> SyncResult<MutationResponse> {
        self.mutate(self.client.put(self.row_url(key)?).json(patch))
            .await
    }

    async fn delete(&self, key: &RowKey) -> SyncResult<MutationResponse> {
        self.mutate(self.client.delete(self.row_url(key)?)).await
    }

    async fn poll(&self, params: &SubscriptionParams) -> SyncResult<FeedBatch> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&params.to_query_pairs())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CONFLICT {
            return Err(rejection(response).await);
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let (handle, offset, cursor, covers) = (
            header(FEED_HANDLE_HEADER),
            header(FEED_OFFSET_HEADER),
            header(FEED_CURSOR_HEADER),
            header(FEED_COVERS_HEADER),
        );
        let body = response.bytes().await.map_err(request_error)?;

        let batch = FeedBatch::decode(&body, handle.as_deref(), offset.as_deref(), cursor.as_deref())?
            .with_covers(covers.as_deref())?;
        if status == StatusCode::CONFLICT && !batch.must_refetch() {
            return Err(SyncError::Protocol("409 response without must-refetch".into()));
        }
        Ok(batch)
    }
}

fn request_error(err: reqwest::Error) -> SyncError {
    if err.is_builder() {
        SyncError::transport_fatal(err.to_string())
    } else {
        SyncError::transport_retryable(err.to_string())
    }
}

// Structured bodies become rejections; anything else is judged by status.
async fn rejection(response: Response) -> SyncError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(error) => SyncError::rejected(error.kind, error.message),
        Err(_) if status.is_server_error() => {
            SyncError::transport_retryable(format!("server returned {status}"))
        }
        Err(_) => SyncError::rejected(ErrorKind::from_status(status.as_u16()), status.to_string()),
    }
}
