//! Per-node runtime state.
//!
//! # Responsibilities
//! - Track failure history, blacklist window, probe results per node
//! - Count active connections with a lock-free counter
//! - Hold the probe/release capability hooks attached by the engine adapter
//!
//! Each entry carries its own mutex; traffic updates on one node never
//! serialize against another node or against the registry map.

use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::BoxFuture;

use super::node::{NodeInfo, NodeSnapshot};

/// Probe capability: measures reachability of the node's upstream, returning
/// the observed latency. Attached by the engine adapter at promotion.
pub type ProbeFn = Arc<dyn Fn() -> BoxFuture<'static, io::Result<Duration>> + Send + Sync>;

/// Release capability: clears the node's blacklist state.
pub type ReleaseFn = Arc<dyn Fn() + Send + Sync>;

struct EntryState {
    info: NodeInfo,
    failure_count: u32,
    consecutive_failures: u32,
    blacklisted: bool,
    blacklist_until: Option<Instant>,
    blacklist_until_wall: Option<SystemTime>,
    last_error: Option<String>,
    last_failure: Option<SystemTime>,
    last_success: Option<SystemTime>,
    last_probe_latency: Option<Duration>,
    probe: Option<ProbeFn>,
    release: Option<ReleaseFn>,
}

/// Mutable runtime state for one node tag.
pub struct NodeEntry {
    state: Mutex<EntryState>,
    active: AtomicI64,
}

impl NodeEntry {
    pub(super) fn new(info: NodeInfo) -> Self {
        Self {
            state: Mutex::new(EntryState {
                info,
                failure_count: 0,
                consecutive_failures: 0,
                blacklisted: false,
                blacklist_until: None,
                blacklist_until_wall: None,
                last_error: None,
                last_failure: None,
                last_success: None,
                last_probe_latency: None,
                probe: None,
                release: None,
            }),
            active: AtomicI64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace identity fields, leaving every counter untouched.
    pub(super) fn update_info(&self, info: NodeInfo) {
        self.lock().info = info;
    }

    pub fn info(&self) -> NodeInfo {
        self.lock().info.clone()
    }

    pub fn tag(&self) -> String {
        self.info().tag
    }

    /// Record a failed connection or probe. Returns the consecutive failure
    /// count so the caller can apply its blacklist threshold.
    pub fn record_failure(&self, err: &str) -> u32 {
        let mut s = self.lock();
        s.failure_count = s.failure_count.saturating_add(1);
        s.consecutive_failures = s.consecutive_failures.saturating_add(1);
        s.last_error = Some(err.to_string());
        s.last_failure = Some(SystemTime::now());
        s.consecutive_failures
    }

    /// Record a successful connection or probe. Resets the consecutive
    /// failure count but never clears an existing blacklist.
    pub fn record_success(&self) {
        let mut s = self.lock();
        s.consecutive_failures = 0;
        s.last_success = Some(SystemTime::now());
    }

    pub fn record_probe_latency(&self, latency: Duration) {
        self.lock().last_probe_latency = Some(latency);
    }

    /// Exclude the node from selection until the given instant.
    pub fn blacklist(&self, until: Instant) {
        let mut s = self.lock();
        s.blacklisted = true;
        s.blacklist_until = Some(until);
        s.blacklist_until_wall =
            Some(SystemTime::now() + until.saturating_duration_since(Instant::now()));
    }

    pub fn clear_blacklist(&self) {
        let mut s = self.lock();
        s.blacklisted = false;
        s.blacklist_until = None;
        s.blacklist_until_wall = None;
        s.consecutive_failures = 0;
    }

    pub fn is_blacklisted(&self) -> bool {
        self.lock().blacklisted
    }

    /// Whether the node may be selected right now. An expired blacklist is
    /// cleared lazily here; there is no dedicated expiry timer.
    pub fn is_usable(&self) -> bool {
        let mut s = self.lock();
        if !s.blacklisted {
            return true;
        }
        match s.blacklist_until {
            Some(until) if Instant::now() >= until => {
                s.blacklisted = false;
                s.blacklist_until = None;
                s.blacklist_until_wall = None;
                s.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    pub fn inc_active(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec_active(&self) {
        // Counter invariant: never below zero.
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                (v > 0).then_some(v - 1)
            });
    }

    pub fn active_connections(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_probe(&self, probe: ProbeFn) {
        self.lock().probe = Some(probe);
    }

    pub fn set_release(&self, release: ReleaseFn) {
        self.lock().release = Some(release);
    }

    pub(super) fn probe_fn(&self) -> Option<ProbeFn> {
        self.lock().probe.clone()
    }

    pub(super) fn release_fn(&self) -> Option<ReleaseFn> {
        self.lock().release.clone()
    }

    pub fn last_success(&self) -> Option<SystemTime> {
        self.lock().last_success
    }

    pub fn last_failure(&self) -> Option<SystemTime> {
        self.lock().last_failure
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let s = self.lock();
        NodeSnapshot {
            info: s.info.clone(),
            failure_count: s.failure_count,
            blacklisted: s.blacklisted,
            blacklisted_until: s.blacklist_until_wall.map(epoch_ms),
            active_connections: self.active.load(Ordering::Acquire),
            last_error: s.last_error.clone(),
            last_failure: s.last_failure.map(epoch_ms),
            last_success: s.last_success.map(epoch_ms),
            last_probe_latency_ms: s
                .last_probe_latency
                .map(|d| d.as_millis() as i64)
                .unwrap_or(-1),
        }
    }
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cheap cloneable reference to one registry entry.
///
/// Handles stay valid across reloads; a handle for a tag that reappears in a
/// new population keeps pointing at the same entry and its history.
#[derive(Clone)]
pub struct NodeHandle {
    entry: Arc<NodeEntry>,
}

impl NodeHandle {
    /// Create a handle not yet inserted into any registry. Used for
    /// candidate populations before promotion.
    pub fn detached(info: NodeInfo) -> Self {
        Self {
            entry: Arc::new(NodeEntry::new(info)),
        }
    }

    pub(super) fn from_entry(entry: Arc<NodeEntry>) -> Self {
        Self { entry }
    }

    pub(super) fn entry(&self) -> &Arc<NodeEntry> {
        &self.entry
    }
}

impl std::ops::Deref for NodeHandle {
    type Target = NodeEntry;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("tag", &self.entry.tag())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn info(tag: &str) -> NodeInfo {
        NodeInfo {
            tag: tag.into(),
            name: tag.to_uppercase(),
            uri: format!("test://{tag}"),
            mode: Default::default(),
            listen_address: None,
            port: None,
        }
    }

    #[test]
    fn blacklist_window_is_respected_then_cleared_lazily() {
        let h = NodeHandle::detached(info("a"));
        h.blacklist(Instant::now() + Duration::from_millis(40));
        assert!(!h.is_usable());
        assert!(h.is_blacklisted());

        std::thread::sleep(Duration::from_millis(60));
        assert!(h.is_usable());
        assert!(!h.is_blacklisted());
    }

    #[test]
    fn success_does_not_clear_blacklist() {
        let h = NodeHandle::detached(info("a"));
        h.blacklist(Instant::now() + Duration::from_secs(60));
        h.record_success();
        assert!(!h.is_usable());
    }

    #[test]
    fn consecutive_failures_reset_on_success() {
        let h = NodeHandle::detached(info("a"));
        assert_eq!(h.record_failure("boom"), 1);
        assert_eq!(h.record_failure("boom"), 2);
        h.record_success();
        assert_eq!(h.record_failure("boom"), 1);

        let snap = h.snapshot();
        assert_eq!(snap.failure_count, 3);
    }

    #[test]
    fn active_counter_never_goes_negative() {
        let h = NodeHandle::detached(info("a"));
        h.dec_active();
        assert_eq!(h.active_connections(), 0);
        h.inc_active();
        h.inc_active();
        h.dec_active();
        assert_eq!(h.active_connections(), 1);
    }

    #[test]
    fn snapshot_reports_latency_sentinel_when_never_probed() {
        let h = NodeHandle::detached(info("a"));
        assert_eq!(h.snapshot().last_probe_latency_ms, -1);
        h.record_probe_latency(Duration::from_millis(42));
        assert_eq!(h.snapshot().last_probe_latency_ms, 42);
    }
}
