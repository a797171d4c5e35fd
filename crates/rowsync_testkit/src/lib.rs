//! # rowsync Testkit
//!
//! Test utilities for rowsync.
//!
//! This crate provides:
//! - Resource fixtures: an owner-scoped `todos` resource and a
//!   self-referencing `folders` resource
//! - `TestServer`: the sync server on an ephemeral local port, backed by a
//!   `MemoryStore` and `MemoryChangeFeed`
//! - Property-based generators for todo payloads
//! - `init_tracing` for test log output honouring `RUST_LOG`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rowsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn creates_a_todo() {
//!     let server = TestServer::start().await;
//!     let url = server.url(TODOS_PATH);
//!     // ... issue requests with header USER_HEADER
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use crate::server::*;
}

pub use fixtures::*;
pub use generators::*;
pub use server::*;

/// Installs a test-friendly tracing subscriber.
///
/// Uses `RUST_LOG` when set, `warn` otherwise. Safe to call from every test.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
