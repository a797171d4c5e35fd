//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// URL of the upstream change-feed service, if served over HTTP.
    pub upstream_url: Option<String>,
    /// Extra query parameters added to every upstream request.
    pub upstream_params: Vec<(String, String)>,
    /// Timeout for upstream requests; must exceed the upstream live timeout.
    pub request_timeout: Duration,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            upstream_url: None,
            upstream_params: Vec::new(),
            request_timeout: Duration::from_secs(60),
            max_body_bytes: 1024 * 1024,
        }
    }

    /// Sets the upstream change-feed URL.
    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = Some(url.into());
        self
    }

    /// Adds a query parameter sent on every upstream request.
    pub fn with_upstream_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.upstream_params.push((name.into(), value.into()));
        self
    }

    /// Sets the upstream request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum request body size.
    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.upstream_url.is_none());
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_upstream_url("http://feed.internal/v1/shape")
            .with_upstream_param("source_secret", "s3cr3t")
            .with_request_timeout(Duration::from_secs(5))
            .with_max_body_bytes(4096);

        assert_eq!(config.upstream_url.as_deref(), Some("http://feed.internal/v1/shape"));
        assert_eq!(config.upstream_params.len(), 1);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_body_bytes, 4096);
    }
}
