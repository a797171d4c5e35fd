//! # rowsync Sync Server
//!
//! HTTP surface of a rowsync deployment.
//!
//! This crate provides:
//! - `MutationGateway`: authorized, transactional create/update/delete that
//!   returns the committing transaction id
//! - `ChangeFeedProxy`: forwards allow-listed subscription parameters to the
//!   upstream change feed with a mandatory, session-derived row filter
//! - `HttpChangeFeed`: HTTP client for an upstream change-feed service
//! - `SyncServer`: axum router wiring both behind one base path per resource
//!
//! ## Routes
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `{base}` | change-feed proxy |
//! | POST | `{base}` | create |
//! | PUT | `{base}/{id}` | update |
//! | DELETE | `{base}/{id}` | delete |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod gateway;
mod proxy;
mod routes;
mod server;
mod session;
mod upstream;

pub use config::ServerConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::MutationGateway;
pub use proxy::{ChangeFeedProxy, STRIPPED_HEADERS};
pub use server::{SyncServer, SyncServerBuilder};
pub use session::{HeaderSessionResolver, SessionResolver};
pub use upstream::HttpChangeFeed;
