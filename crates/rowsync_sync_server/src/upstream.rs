//! HTTP client for an upstream change-feed service.

use crate::config::ServerConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use rowsync_core::{ChangeFeedService, CoreError, CoreResult, FeedRequest, FeedResponse};
use rowsync_sync_protocol::WHERE_PARAM;
use std::time::Duration;

/// Change-feed service reached over HTTP.
///
/// Each subscription becomes one `GET` on the upstream URL carrying the
/// allow-listed parameters, the rendered row filter as `where`, and the
/// configured server-side parameters. The response body is streamed.
#[derive(Debug, Clone)]
pub struct HttpChangeFeed {
    client: reqwest::Client,
    url: String,
    params: Vec<(String, String)>,
}

impl HttpChangeFeed {
    /// Creates a client for the given upstream URL.
    pub fn new(url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            params: Vec::new(),
        })
    }

    /// Creates a client from the server configuration, if it names an upstream URL.
    pub fn from_config(config: &ServerConfig) -> CoreResult<Option<Self>> {
        let Some(ref url) = config.upstream_url else {
            return Ok(None);
        };
        let mut feed = Self::new(url.clone(), config.request_timeout)?;
        feed.params = config.upstream_params.clone();
        Ok(Some(feed))
    }

    /// Adds a parameter sent on every request.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    fn query(&self, request: &FeedRequest) -> Vec<(String, String)> {
        let mut query = request.params.to_query_pairs();
        if let Some(filter) = request.filter.as_ref().filter(|f| !f.is_trivial()) {
            query.push((WHERE_PARAM.to_string(), filter.to_where_clause()));
        }
        query.extend(self.params.iter().cloned());
        query
    }
}

#[async_trait]
impl ChangeFeedService for HttpChangeFeed {
    async fn subscribe(&self, request: FeedRequest) -> CoreResult<FeedResponse> {
        let query = self.query(&request);
        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await
            .map_err(|e| CoreError::upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes_stream()
            .map_err(|e| CoreError::upstream(e.to_string()));

        Ok(FeedResponse::new(status, headers, Box::pin(body)))
    }
}
