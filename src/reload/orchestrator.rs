//! Reload orchestration.
//!
//! # Responsibilities
//! - Drive one session through fetch → build → preflight → switch → drain
//! - Enforce the single-in-flight rule (concurrent triggers observe Busy)
//! - Keep the previous instance fully intact on every pre-switch failure
//! - Run to Closed once the switch has begun, even under shutdown
//!
//! The in-flight flag is independent of the registry locks: probes and
//! traffic counters are never blocked by a reload in progress.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use crate::engine::instance::InstanceNode;
use crate::engine::{DrainOutcome, EngineBuilder, EngineError, EngineInstance};
use crate::lifecycle::Shutdown;
use crate::pool::Pool;
use crate::registry::{run_probe, NodeHandle, NodeInfo, NodeRegistry};
use crate::subscription::{FetchError, NodeSource, SubscriptionStatus};

use super::session::{ReloadSession, ReloadSummary};
use super::{ReloadError, ReloadSettings, ReloadState, ReloadStatus};

const DRAIN_POLL_PERIOD: Duration = Duration::from_millis(100);

/// The central reload state machine. One per process, shared via `Arc`.
pub struct ReloadOrchestrator {
    registry: Arc<NodeRegistry>,
    source: Arc<dyn NodeSource>,
    builder: Arc<dyn EngineBuilder>,
    settings: ReloadSettings,
    subscription: Arc<SubscriptionStatus>,
    shutdown: Arc<Shutdown>,
    active: ArcSwapOption<EngineInstance>,
    in_flight: AtomicBool,
    status: Mutex<ReloadStatus>,
}

impl ReloadOrchestrator {
    pub fn new(
        registry: Arc<NodeRegistry>,
        source: Arc<dyn NodeSource>,
        builder: Arc<dyn EngineBuilder>,
        settings: ReloadSettings,
        subscription: Arc<SubscriptionStatus>,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        Self {
            registry,
            source,
            builder,
            settings,
            subscription,
            shutdown,
            active: ArcSwapOption::const_empty(),
            in_flight: AtomicBool::new(false),
            status: Mutex::new(ReloadStatus {
                state: ReloadState::Idle,
                session_id: None,
                last_outcome: None,
                drained: None,
                total: None,
            }),
        }
    }

    /// The instance currently holding the accepting role.
    pub fn active_instance(&self) -> Option<Arc<EngineInstance>> {
        self.active.load_full()
    }

    pub fn reload_status(&self) -> ReloadStatus {
        self.lock_status().clone()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Run one reload session to completion, returning its summary.
    ///
    /// Fails synchronously with `Busy` when a session is already in flight.
    pub async fn reload(&self) -> Result<ReloadSummary, ReloadError> {
        let session = self.acquire()?;
        let _guard = InFlightGuard(&self.in_flight);
        let result = self.run_session(session).await;
        self.finish(session, &result);
        result
    }

    /// Trigger a reload without waiting for it: the session runs on its own
    /// task. The Busy check still happens synchronously, so a concurrent
    /// caller gets its rejection immediately.
    pub fn try_start(self: Arc<Self>) -> Result<uuid::Uuid, ReloadError> {
        let session = self.acquire()?;
        tokio::spawn(async move {
            let _guard = InFlightGuard(&self.in_flight);
            let result = self.run_session(session).await;
            self.finish(session, &result);
            if let Err(e) = result {
                tracing::warn!(session = %session.id, error = %e, "Reload failed");
            }
        });
        Ok(session.id)
    }

    /// Close the active instance on process shutdown. Not part of a reload;
    /// connections still open are cut.
    pub async fn close_active(&self) {
        if let Some(active) = self.active.swap(None) {
            match active.close().await {
                Ok(()) => tracing::info!(instance = %active.id(), "Active instance closed"),
                Err(e) => {
                    tracing::warn!(instance = %active.id(), error = %e, "Active instance close failed")
                }
            }
        }
    }

    /// Take the single-in-flight flag, or fail with Busy. The caller owns
    /// releasing it via `InFlightGuard`.
    fn acquire(&self) -> Result<ReloadSession, ReloadError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ReloadError::Busy);
        }
        let session = ReloadSession::new();
        let mut status = self.lock_status();
        status.session_id = Some(session.id);
        status.drained = None;
        status.total = None;
        Ok(session)
    }

    fn finish(&self, session: ReloadSession, result: &Result<ReloadSummary, ReloadError>) {
        let mut status = self.lock_status();
        match result {
            Ok(summary) => {
                status.state = ReloadState::Idle;
                status.last_outcome = Some(ReloadState::Closed);
                metrics::counter!("pool_reloads_total", "outcome" => "closed").increment(1);
                tracing::info!(
                    session = %session.id,
                    nodes = summary.node_count,
                    healthy = summary.healthy_nodes,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "Reload complete"
                );
            }
            Err(_) => {
                status.state = ReloadState::RolledBack;
                status.last_outcome = Some(ReloadState::RolledBack);
                metrics::counter!("pool_reloads_total", "outcome" => "rolled_back").increment(1);
            }
        }
    }

    async fn run_session(&self, session: ReloadSession) -> Result<ReloadSummary, ReloadError> {
        let mut cancel = self.shutdown.subscribe();

        // FetchingNodes
        self.set_state(ReloadState::FetchingNodes);
        self.check_cancel()?;
        let candidates = tokio::select! {
            fetched = tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch()) => {
                match fetched {
                    Ok(Ok(nodes)) => nodes,
                    Ok(Err(e)) => {
                        self.subscription.record_error(&e.to_string());
                        return Err(ReloadError::Fetch(e));
                    }
                    Err(_) => {
                        let e = FetchError::Timeout;
                        self.subscription.record_error(&e.to_string());
                        return Err(ReloadError::Fetch(e));
                    }
                }
            }
            _ = cancel.recv() => return Err(ReloadError::Cancelled),
        };
        self.subscription.record_success(candidates.len());
        tracing::info!(session = %session.id, count = candidates.len(), "Candidate nodes fetched");

        // BuildingInstance
        self.set_state(ReloadState::BuildingInstance);
        self.check_cancel()?;
        let candidate = self.build_candidate(candidates)?;

        // PreflightChecking
        self.set_state(ReloadState::PreflightChecking);
        self.check_cancel()?;
        let healthy = tokio::select! {
            healthy = self.preflight(&candidate) => healthy,
            _ = cancel.recv() => {
                let _ = candidate.close().await;
                return Err(ReloadError::Cancelled);
            }
        };
        if healthy < self.settings.min_available_nodes {
            let _ = candidate.close().await;
            return Err(ReloadError::Preflight {
                available: healthy,
                required: self.settings.min_available_nodes,
            });
        }

        // Switching: bind first, unbind later. A start failure leaves the
        // previous instance accepting; there is never a window with zero
        // listeners.
        self.set_state(ReloadState::Switching);
        if self.shutdown.is_triggered() {
            let _ = candidate.close().await;
            return Err(ReloadError::Cancelled);
        }
        if let Err(e) = candidate.start().await {
            let _ = candidate.close().await;
            return Err(match e {
                EngineError::Bind(msg) => ReloadError::Bind(msg),
                other => ReloadError::Build(other.to_string()),
            });
        }
        self.promote(&candidate);
        let previous = self.active.swap(Some(candidate.clone()));
        tracing::info!(
            session = %session.id,
            instance = %candidate.id(),
            nodes = candidate.nodes().len(),
            "Engine instance promoted"
        );

        // Past the switch: run to Closed regardless of shutdown.
        let mut drain = None;
        if let Some(old) = previous {
            self.set_state(ReloadState::Draining);
            let outcome = self.drain(&old).await;
            if let Err(e) = old.close().await {
                tracing::warn!(instance = %old.id(), error = %e, "Previous instance close failed");
            } else {
                tracing::info!(instance = %old.id(), "Previous instance closed");
            }
            drain = Some(outcome);
        }

        let keep: HashSet<String> = candidate.tags().map(str::to_string).collect();
        self.registry.retain(&keep);
        metrics::gauge!("pool_nodes").set(keep.len() as f64);

        self.set_state(ReloadState::Closed);
        Ok(ReloadSummary {
            session_id: session.id,
            node_count: candidate.nodes().len(),
            healthy_nodes: healthy,
            drain,
            elapsed: session.elapsed(),
        })
    }

    /// Assemble the candidate population and engine. Tags already known to
    /// the registry keep their entry (and history); new tags get detached
    /// entries that join the registry only at promotion.
    fn build_candidate(
        &self,
        candidates: Vec<NodeInfo>,
    ) -> Result<Arc<EngineInstance>, ReloadError> {
        let mut population: Vec<(NodeInfo, NodeHandle)> = Vec::with_capacity(candidates.len());
        let mut seen = HashSet::new();
        for info in candidates {
            if !seen.insert(info.tag.clone()) {
                tracing::warn!(tag = %info.tag, "Duplicate tag in subscription, skipping");
                continue;
            }
            let handle = self
                .registry
                .lookup(&info.tag)
                .unwrap_or_else(|| NodeHandle::detached(info.clone()));
            population.push((info, handle));
        }

        let pool = Arc::new(Pool::new(
            population.iter().map(|(_, h)| h.clone()).collect(),
            self.settings.pool_mode,
        ));
        let built = self.builder.build(&pool, &population).map_err(|e| match e {
            EngineError::Bind(msg) => ReloadError::Bind(msg),
            other => ReloadError::Build(other.to_string()),
        })?;

        let nodes = population
            .into_iter()
            .map(|(info, handle)| {
                let probe = built.probes.get(&info.tag).cloned();
                InstanceNode {
                    info,
                    handle,
                    probe,
                }
            })
            .collect();
        Ok(Arc::new(EngineInstance::new(pool, nodes, built.engine)))
    }

    /// Give every candidate node a chance to complete one probe within the
    /// health-check bound, then count the healthy ones.
    async fn preflight(&self, candidate: &EngineInstance) -> usize {
        let probes: Vec<_> = candidate
            .nodes()
            .iter()
            .filter_map(|n| n.probe.clone().map(|p| (n.handle.clone(), p)))
            .collect();

        let wait = futures_util::future::join_all(
            probes
                .into_iter()
                .map(|(handle, probe)| async move { run_probe(&handle, &probe).await.is_ok() }),
        );
        if tokio::time::timeout(self.settings.health_check_timeout, wait)
            .await
            .is_err()
        {
            tracing::warn!("Preflight timed out before every node completed a probe");
        }

        candidate
            .nodes()
            .iter()
            .filter(|n| node_is_healthy(&n.handle))
            .count()
    }

    /// Attach capability hooks and adopt the population into the registry.
    fn promote(&self, candidate: &Arc<EngineInstance>) {
        for node in candidate.nodes() {
            if let Some(probe) = &node.probe {
                node.handle.set_probe(probe.clone());
            }
            let target = node.handle.clone();
            node.handle
                .set_release(Arc::new(move || target.clear_blacklist()));
        }
        let pairs: Vec<(NodeInfo, NodeHandle)> = candidate
            .nodes()
            .iter()
            .map(|n| (n.info.clone(), n.handle.clone()))
            .collect();
        self.registry.commit(&pairs);
    }

    /// Stop the old instance from accepting and wait for its connections to
    /// finish, bounded by `drain_timeout`. The count is non-increasing once
    /// draining starts; a timeout forces closure.
    async fn drain(&self, old: &EngineInstance) -> DrainOutcome {
        old.begin_drain().await;
        let started = Instant::now();
        let total = old.active_connections();
        self.set_progress(0, total);
        tracing::info!(instance = %old.id(), active = total, "Draining previous instance");

        let deadline = started + self.settings.drain_timeout;
        let mut ticker = tokio::time::interval(DRAIN_POLL_PERIOD);
        loop {
            ticker.tick().await;
            let remaining = old.active_connections();
            self.set_progress(total - remaining, total);

            if remaining <= 0 {
                let elapsed = started.elapsed();
                tracing::info!(
                    instance = %old.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Drain complete"
                );
                return DrainOutcome::Drained { elapsed };
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    instance = %old.id(),
                    remaining,
                    "Drain timed out, forcing close"
                );
                return DrainOutcome::TimedOut { remaining };
            }
        }
    }

    fn check_cancel(&self) -> Result<(), ReloadError> {
        if self.shutdown.is_triggered() {
            Err(ReloadError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, ReloadStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ReloadState) {
        self.lock_status().state = state;
        tracing::debug!(state = ?state, "Reload state");
    }

    fn set_progress(&self, drained: i64, total: i64) {
        let mut status = self.lock_status();
        status.drained = Some(drained.max(0));
        status.total = Some(total);
    }
}

fn node_is_healthy(handle: &NodeHandle) -> bool {
    match (handle.last_success(), handle.last_failure()) {
        (Some(success), Some(failure)) => success > failure,
        (Some(_), None) => true,
        _ => false,
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
