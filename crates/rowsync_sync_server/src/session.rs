//! Session resolution.
//!
//! Authentication itself happens outside the sync server. A
//! [`SessionResolver`] turns the headers of an already authenticated request
//! into a [`Session`]; requests it cannot resolve are unauthenticated.

use async_trait::async_trait;
use axum::http::HeaderMap;
use rowsync_core::Session;

/// Produces the session of a request.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Returns the caller's session, or `None` if the request is unauthenticated.
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Reads the user id from a header set by a trusted authenticating proxy.
#[derive(Debug, Clone)]
pub struct HeaderSessionResolver {
    header: String,
}

impl HeaderSessionResolver {
    /// Creates a resolver reading the given header.
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl Default for HeaderSessionResolver {
    fn default() -> Self {
        Self::new("x-user-id")
    }
}

#[async_trait]
impl SessionResolver for HeaderSessionResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Session> {
        let user = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if user.is_empty() {
            return None;
        }
        Some(Session::new(user))
    }
}
