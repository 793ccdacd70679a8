//! Per-reload session bookkeeping.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::engine::DrainOutcome;

/// Transient value tracking one reload attempt. Never persisted; discarded
/// when the session completes or aborts.
#[derive(Debug, Clone, Copy)]
pub struct ReloadSession {
    pub id: Uuid,
    pub started: Instant,
}

impl ReloadSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ReloadSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a completed reload session.
#[derive(Debug, Clone, Copy)]
pub struct ReloadSummary {
    pub session_id: Uuid,
    pub node_count: usize,
    pub healthy_nodes: usize,
    pub drain: Option<DrainOutcome>,
    pub elapsed: Duration,
}
