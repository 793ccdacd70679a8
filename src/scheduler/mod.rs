//! Refresh scheduling subsystem.
//!
//! # Responsibilities
//! - Tick at the configured interval and invoke the reload entry point
//! - Expose the on-demand trigger used by the control API
//! - Stop cleanly on shutdown without force-closing the active instance
//!
//! Both the timer path and the on-demand path go through the orchestrator's
//! single-in-flight rule; a tick that lands during an on-demand reload just
//! observes Busy and waits for the next interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::reload::{ReloadError, ReloadOrchestrator};

pub struct RefreshScheduler {
    orchestrator: Arc<ReloadOrchestrator>,
    interval: Duration,
    enabled: bool,
}

impl RefreshScheduler {
    pub fn new(orchestrator: Arc<ReloadOrchestrator>, interval: Duration, enabled: bool) -> Self {
        Self {
            orchestrator,
            interval,
            enabled,
        }
    }

    /// On-demand trigger: starts a reload session on its own task. The Busy
    /// rejection is synchronous.
    pub fn trigger_now(&self) -> Result<Uuid, ReloadError> {
        self.orchestrator.clone().try_start()
    }

    /// Periodic loop. Returns once the shutdown signal arrives.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.enabled {
            tracing::info!("Subscription refresh disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Refresh scheduler starting"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick is the startup load; consume it so the
        // loop only fires on real intervals.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.orchestrator.reload().await {
                        Ok(summary) => {
                            tracing::debug!(
                                session = %summary.session_id,
                                nodes = summary.node_count,
                                "Scheduled reload finished"
                            );
                        }
                        Err(ReloadError::Busy) => {
                            tracing::debug!("Scheduled reload skipped, session already in flight");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Scheduled reload failed, will retry next tick");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Refresh scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
