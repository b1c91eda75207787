//! HTTP API for batch commits and the Git-host lookups the editor needs.
//!
//! Every route under `/api` requires a bearer credential, which is used to
//! act on the Git host on the caller's behalf.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::BearerToken;
pub use handlers::ApiError;
pub use server::{AppState, WebServer};

/// Error types for web operations
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Server startup failed: {0}")]
    StartupFailed(String),
}
