use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::registry::{NodeRegistry, RegistryError};
use crate::reload::{ReloadError, ReloadOrchestrator, ReloadStatus};
use crate::scheduler::RefreshScheduler;
use crate::subscription::SubscriptionStatus;

/// Shared state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub orchestrator: Arc<ReloadOrchestrator>,
    pub scheduler: Arc<RefreshScheduler>,
    pub subscription: Arc<SubscriptionStatus>,
}

pub async fn refresh_subscription(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scheduler.trigger_now() {
        Ok(session_id) => (
            StatusCode::ACCEPTED,
            Json(json!({ "message": "refresh started", "session_id": session_id })),
        ),
        Err(ReloadError::Busy) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": ReloadError::Busy.to_string() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

pub async fn subscription_status(State(state): State<AppState>) -> Json<Value> {
    Json(state.subscription.to_json())
}

pub async fn reload_status(State(state): State<AppState>) -> Json<ReloadStatus> {
    Json(state.orchestrator.reload_status())
}

pub async fn list_nodes(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "nodes": state.registry.snapshot() }))
}

pub async fn probe_node(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.probe(&tag).await {
        Ok(latency) => (
            StatusCode::OK,
            Json(json!({ "latency_ms": latency.as_millis() as u64 })),
        ),
        Err(e) => registry_error_response(e),
    }
}

pub async fn release_node(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.registry.release(&tag) {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "message": "blacklist cleared" })),
        ),
        Err(e) => registry_error_response(e),
    }
}

fn registry_error_response(err: RegistryError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::CapabilityUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::ProbeFailed(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(json!({ "error": err.to_string() })))
}
