//! In-process HTTP test server.

use crate::fixtures::{folder_descriptor, todo_descriptor, FOLDERS_PATH, TODOS_PATH, USER_HEADER};
use rowsync_core::{MemoryChangeFeed, MemoryFeedConfig, MemoryStore};
use rowsync_sync_server::{HeaderSessionResolver, ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Live long-poll timeout used by test servers.
pub const TEST_LIVE_TIMEOUT: Duration = Duration::from_millis(500);

/// A sync server serving the fixture resources on `127.0.0.1:0`.
///
/// The server task is aborted when this value is dropped.
pub struct TestServer {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server with a fresh in-memory store.
    pub async fn start() -> Self {
        Self::start_with_store(Arc::new(MemoryStore::new())).await
    }

    /// Starts a server on an existing store.
    pub async fn start_with_store(store: Arc<MemoryStore>) -> Self {
        let server = build_server(Arc::clone(&store));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");
        let task = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                tracing::warn!(error = %e, "test server stopped");
            }
        });
        Self { addr, store, task }
    }

    /// Returns the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the `http://` base URL.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Returns the absolute URL of a path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Returns the backing store.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Builds a sync server for the fixture resources on a store.
pub fn build_server(store: Arc<MemoryStore>) -> SyncServer {
    let feed = MemoryChangeFeed::with_config(
        Arc::clone(&store),
        MemoryFeedConfig::default().with_live_timeout(TEST_LIVE_TIMEOUT),
    );
    SyncServer::builder(ServerConfig::default())
        .resolver(Arc::new(HeaderSessionResolver::new(USER_HEADER)))
        .store(store)
        .feed(Arc::new(feed))
        .resource(TODOS_PATH, todo_descriptor())
        .resource(FOLDERS_PATH, folder_descriptor())
        .build()
        .expect("Failed to build test server")
}
