//! Graceful reload subsystem.
//!
//! # States
//! ```text
//! Idle → FetchingNodes → BuildingInstance → PreflightChecking
//!      → Switching → Draining → Closed → (Idle)
//!
//! FetchingNodes / BuildingInstance / PreflightChecking → RolledBack
//! ```
//!
//! A reload either adopts the full candidate population or none of it.
//! Fetch, build, preflight, and bind failures roll back with the previous
//! instance untouched; a drain timeout forces closure and is not an error.
//! Only one session may be in flight; concurrent triggers observe Busy.

pub mod orchestrator;
pub mod session;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::pool::PoolMode;
use crate::subscription::FetchError;

pub use orchestrator::ReloadOrchestrator;
pub use session::{ReloadSession, ReloadSummary};

/// Orchestrator state, as exposed by the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadState {
    Idle,
    FetchingNodes,
    BuildingInstance,
    PreflightChecking,
    Switching,
    Draining,
    Closed,
    RolledBack,
}

/// Errors that abort a reload session.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("reload already in progress")]
    Busy,

    #[error("subscription fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("engine build failed: {0}")]
    Build(String),

    #[error("preflight gate failed: {available} of {required} required nodes available")]
    Preflight { available: usize, required: usize },

    #[error("listener bind conflict: {0}")]
    Bind(String),

    #[error("reload cancelled by shutdown")]
    Cancelled,
}

/// Bounds and policy for reload sessions.
#[derive(Debug, Clone)]
pub struct ReloadSettings {
    pub fetch_timeout: Duration,
    pub health_check_timeout: Duration,
    pub drain_timeout: Duration,
    pub min_available_nodes: usize,
    pub pool_mode: PoolMode,
}

/// Snapshot of the orchestrator for `GET /api/reload/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadStatus {
    pub state: ReloadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<ReloadState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drained: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}
