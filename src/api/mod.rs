//! Control and status API.
//!
//! Surface:
//! - `POST /api/subscription/refresh` — trigger a reload (202, or 409 Busy)
//! - `GET  /api/subscription/status` — last refresh outcome
//! - `GET  /api/reload/status` — orchestrator state and drain progress
//! - `GET  /api/nodes` — node snapshots
//! - `POST /api/nodes/{tag}/probe` — manual health check
//! - `POST /api/nodes/{tag}/release` — clear blacklist

pub mod handlers;
pub mod server;

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::handlers::*;

pub use handlers::AppState;
pub use server::ApiServer;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/subscription/refresh", post(refresh_subscription))
        .route("/api/subscription/status", get(subscription_status))
        .route("/api/reload/status", get(reload_status))
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/{tag}/probe", post(probe_node))
        .route("/api/nodes/{tag}/release", post(release_node))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
}
