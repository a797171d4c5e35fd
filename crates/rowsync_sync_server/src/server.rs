//! Sync server assembly.

use crate::config::ServerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::MutationGateway;
use crate::proxy::ChangeFeedProxy;
use crate::routes::{resource_router, ResourceState};
use crate::session::SessionResolver;
use crate::upstream::HttpChangeFeed;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use rowsync_core::{ChangeFeedService, ResourceDescriptor, Store};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// A sync server serving a set of resources.
///
/// Each resource is mounted at its own base path. Mutations go through a
/// [`MutationGateway`] on the shared store; subscriptions go through a
/// [`ChangeFeedProxy`] on the shared upstream change feed.
pub struct SyncServer {
    config: ServerConfig,
    resolver: Arc<dyn SessionResolver>,
    store: Arc<dyn Store>,
    feed: Arc<dyn ChangeFeedService>,
    resources: Vec<(String, Arc<ResourceDescriptor>)>,
}

impl SyncServer {
    /// Starts building a server.
    pub fn builder(config: ServerConfig) -> SyncServerBuilder {
        SyncServerBuilder {
            config,
            resolver: None,
            store: None,
            feed: None,
            resources: Vec::new(),
        }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the axum router for all resources.
    pub fn router(&self) -> Router {
        let mut router = Router::new();
        for (base_path, descriptor) in &self.resources {
            let state = ResourceState {
                gateway: Arc::new(MutationGateway::new(
                    Arc::clone(descriptor),
                    Arc::clone(&self.store),
                )),
                proxy: Arc::new(ChangeFeedProxy::new(
                    Arc::clone(descriptor),
                    Arc::clone(&self.feed),
                )),
                resolver: Arc::clone(&self.resolver),
            };
            router = router.merge(resource_router(base_path, state));
        }
        router
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
    }

    /// Serves requests on an already bound listener until the task is cancelled.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let router = self.router();
        tracing::info!(
            addr = ?listener.local_addr().ok(),
            resources = self.resources.len(),
            "sync server listening"
        );
        axum::serve(listener, router).await
    }

    /// Binds the configured address and serves requests.
    pub async fn bind_and_serve(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }
}

impl std::fmt::Debug for SyncServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncServer")
            .field("config", &self.config)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncServer`].
pub struct SyncServerBuilder {
    config: ServerConfig,
    resolver: Option<Arc<dyn SessionResolver>>,
    store: Option<Arc<dyn Store>>,
    feed: Option<Arc<dyn ChangeFeedService>>,
    resources: Vec<(String, Arc<ResourceDescriptor>)>,
}

impl SyncServerBuilder {
    /// Sets the session resolver.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn SessionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the store mutations are written to.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the upstream change feed.
    ///
    /// Defaults to an [`HttpChangeFeed`] on the configured upstream URL.
    #[must_use]
    pub fn feed(mut self, feed: Arc<dyn ChangeFeedService>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Mounts a resource at a base path such as `/api/todos`.
    #[must_use]
    pub fn resource(mut self, base_path: impl Into<String>, descriptor: ResourceDescriptor) -> Self {
        self.resources.push((base_path.into(), Arc::new(descriptor)));
        self
    }

    /// Builds the server.
    pub fn build(self) -> GatewayResult<SyncServer> {
        let resolver = self
            .resolver
            .ok_or_else(|| GatewayError::Config("a session resolver is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| GatewayError::Config("a store is required".into()))?;

        let feed = match self.feed {
            Some(feed) => feed,
            None => match HttpChangeFeed::from_config(&self.config)? {
                Some(http) => Arc::new(http) as Arc<dyn ChangeFeedService>,
                None => {
                    return Err(GatewayError::Config(
                        "a change feed or an upstream URL is required".into(),
                    ))
                }
            },
        };

        for (path, _) in &self.resources {
            if !path.starts_with('/') || path.len() < 2 {
                return Err(GatewayError::Config(format!("invalid base path `{path}`")));
            }
        }

        Ok(SyncServer {
            config: self.config,
            resolver,
            store,
            feed,
            resources: self.resources,
        })
    }
}
