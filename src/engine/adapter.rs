//! Engine-to-registry wiring.
//!
//! # Responsibilities
//! - Bracket connection open/close with the node's active counter
//! - Feed per-connection outcomes back into the registry entry
//! - Apply the failure-threshold / blacklist policy

use std::time::{Duration, Instant};

use crate::registry::NodeHandle;

/// When a node gets blacklisted after repeated failures.
#[derive(Debug, Clone, Copy)]
pub struct FailurePolicy {
    /// Consecutive failures before the node is blacklisted.
    pub failure_threshold: u32,

    /// How long a blacklisted node stays out of selection.
    pub blacklist_duration: Duration,
}

impl FailurePolicy {
    /// Record a failed connection on the node and blacklist it once the
    /// threshold is reached. A later success never lifts the blacklist;
    /// only expiry or an explicit release does.
    pub fn report_failure(&self, node: &NodeHandle, err: &str) {
        let consecutive = node.record_failure(err);
        metrics::counter!("pool_node_failures_total").increment(1);

        if consecutive >= self.failure_threshold {
            let until = Instant::now() + self.blacklist_duration;
            node.blacklist(until);
            tracing::warn!(
                tag = %node.tag(),
                consecutive,
                duration_secs = self.blacklist_duration.as_secs(),
                "Node blacklisted after repeated failures"
            );
        }
    }

    pub fn report_success(&self, node: &NodeHandle) {
        node.record_success();
    }
}

/// RAII bracket around one connection: increments the node's active counter
/// on creation, decrements on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    node: NodeHandle,
}

impl ConnectionGuard {
    pub fn open(node: NodeHandle) -> Self {
        node.inc_active();
        Self { node }
    }

    pub fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.node.dec_active();
    }
}
