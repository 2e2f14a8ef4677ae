//! HTTP blob service.
//!
//! Clients store, fetch and delete opaque blobs addressed by a validated
//! path. Bodies stream straight to disk and are published atomically; the
//! manifest mapping paths to blobs is journaled so it survives restarts.

pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod router;
pub mod server;
pub mod state;

pub use admin::{build_admin_router, HealthResponse, InfoResponse};
pub use auth::{Action, ClientStore, Credentials, Identity, OpenClientStore};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::build_router;
pub use server::BlobServer;
pub use state::AppState;
