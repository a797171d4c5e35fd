//! Change-feed proxy.
//!
//! Clients subscribe to a resource through the proxy, never directly to the
//! upstream service. The proxy keeps only allow-listed query parameters,
//! pins the table to the resource's table and attaches the resource's
//! session-derived row filter, which the client cannot supply or override.

use crate::error::{GatewayError, GatewayResult};
use rowsync_core::{ChangeFeedService, FeedRequest, FeedResponse, ResourceDescriptor, Session};
use rowsync_sync_protocol::SubscriptionParams;
use std::sync::Arc;

/// Upstream response headers that are not forwarded to clients.
pub const STRIPPED_HEADERS: [&str; 3] = ["content-length", "content-encoding", "transfer-encoding"];

/// Forwards subscriptions for one resource to the upstream change feed.
pub struct ChangeFeedProxy {
    descriptor: Arc<ResourceDescriptor>,
    upstream: Arc<dyn ChangeFeedService>,
}

impl ChangeFeedProxy {
    /// Creates a proxy for a resource.
    pub fn new(descriptor: Arc<ResourceDescriptor>, upstream: Arc<dyn ChangeFeedService>) -> Self {
        Self {
            descriptor,
            upstream,
        }
    }

    /// Subscribes on behalf of a session with the client's raw query pairs.
    pub async fn subscribe<I, K, V>(
        &self,
        session: Option<&Session>,
        query: I,
    ) -> GatewayResult<FeedResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let session = session.ok_or(GatewayError::Unauthenticated)?;
        let resource = self.descriptor.name();

        let (mut params, dropped) = SubscriptionParams::from_query_pairs(query)?;
        if !dropped.is_empty() {
            tracing::debug!(resource, ?dropped, "dropped query parameters outside the allow-list");
        }
        params.table = Some(self.descriptor.table().to_string());

        let mut request = FeedRequest::new(params);
        if let Some(filter) = self.descriptor.row_filter_for(session) {
            request = request.with_filter(filter);
        }

        let mut response = self.upstream.subscribe(request).await.map_err(|err| {
            tracing::warn!(resource, error = %err, "upstream subscription failed");
            GatewayError::Upstream(err.to_string())
        })?;

        response
            .headers
            .retain(|(name, _)| !STRIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)));
        tracing::debug!(resource, status = response.status, user = session.user_id(), "proxied subscription");
        Ok(response)
    }
}

impl std::fmt::Debug for ChangeFeedProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeedProxy")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
