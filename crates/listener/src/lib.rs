//! C5 Change Listener: an axum HTTP server that authenticates
//! remote-originated webhook events and exposes manual sync control and
//! health endpoints.

mod event;
mod routes;
#[cfg(test)]
mod routes_test;
pub mod signature;
mod state;

pub use state::ListenerState;

use axum::routing::{get, post};
use axum::Router;

/// Builds the router described in spec §4.5: `POST /webhook/{provider}`,
/// `POST /sync/trigger`, `GET /sync/status`, `GET /health`.
pub fn build_router(state: ListenerState) -> Router {
    Router::new()
        .route("/webhook/{provider}", post(routes::webhook))
        .route("/sync/trigger", post(routes::sync_trigger))
        .route("/sync/status", get(routes::sync_status))
        .route("/health", get(routes::health))
        .with_state(state)
}
