//! Node registry subsystem.
//!
//! # Data Flow
//! ```text
//! subscription refresh → register / commit (identity)
//! engine traffic       → record_failure / record_success / inc / dec (runtime)
//! control API          → snapshot / probe / release
//! ```
//!
//! # Concurrency
//! - Registry-level `RwLock` guards only the tag map; held for insert,
//!   lookup, and the entry-list copy in `snapshot()`.
//! - All counter and timestamp updates go through the entry's own lock,
//!   so unrelated nodes never serialize on each other's traffic.

pub mod entry;
pub mod node;

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use thiserror::Error;

pub use entry::{NodeEntry, NodeHandle, ProbeFn, ReleaseFn};
pub use node::{NodeInfo, NodeMode, NodeSnapshot};

/// Errors from registry lookups and capability calls.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("node {0} not found")]
    NotFound(String),

    #[error("{capability} not available for this node")]
    CapabilityUnavailable { capability: &'static str },

    #[error("probe failed: {0}")]
    ProbeFailed(String),
}

/// Aggregates identity and runtime state for every known node.
///
/// Entries are created on first registration of a tag and survive reloads
/// for as long as the tag stays in the population; `retain` drops the rest
/// once an old engine instance has been disposed.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<String, Arc<NodeEntry>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<NodeEntry>>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<NodeEntry>>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Ensure a node is tracked and return its handle.
    ///
    /// Idempotent on tag: an existing entry gets its identity updated but
    /// keeps failure history, blacklist state, and connection counters.
    pub fn register(&self, info: NodeInfo) -> NodeHandle {
        let mut nodes = self.write();
        match nodes.get(&info.tag) {
            Some(entry) => {
                let entry = entry.clone();
                drop(nodes);
                entry.update_info(info);
                NodeHandle::from_entry(entry)
            }
            None => {
                let entry = Arc::new(NodeEntry::new(info.clone()));
                nodes.insert(info.tag, entry.clone());
                NodeHandle::from_entry(entry)
            }
        }
    }

    pub fn lookup(&self, tag: &str) -> Option<NodeHandle> {
        self.read().get(tag).cloned().map(NodeHandle::from_entry)
    }

    /// Adopt a promoted population: insert entries for new tags and refresh
    /// identity on reused ones. Counters on reused entries are untouched.
    pub fn commit(&self, nodes: &[(NodeInfo, NodeHandle)]) {
        {
            let mut map = self.write();
            for (info, handle) in nodes {
                map.insert(info.tag.clone(), handle.entry().clone());
            }
        }
        for (info, handle) in nodes {
            handle.update_info(info.clone());
        }
    }

    /// Drop entries whose tag is absent from `keep`. Called only after the
    /// instance that owned them has been disposed.
    pub fn retain(&self, keep: &HashSet<String>) {
        self.write().retain(|tag, _| keep.contains(tag));
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted copy of the current node states. The entry list is copied
    /// under the map lock; formatting happens without it. Order is stable,
    /// determined by display name.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        let entries: Vec<Arc<NodeEntry>> = self.read().values().cloned().collect();
        let mut snapshots: Vec<NodeSnapshot> =
            entries.iter().map(|e| e.snapshot()).collect();
        snapshots.sort_by(|a, b| {
            a.info
                .name
                .cmp(&b.info.name)
                .then_with(|| a.info.tag.cmp(&b.info.tag))
        });
        snapshots
    }

    /// Trigger a manual health check on one node.
    pub async fn probe(&self, tag: &str) -> Result<Duration, RegistryError> {
        let entry = self
            .lookup(tag)
            .ok_or_else(|| RegistryError::NotFound(tag.to_string()))?;
        let probe = entry
            .probe_fn()
            .ok_or(RegistryError::CapabilityUnavailable { capability: "probe" })?;
        run_probe(&entry, &probe)
            .await
            .map_err(|e| RegistryError::ProbeFailed(e.to_string()))
    }

    /// Clear blacklist state on one node via its release capability.
    pub fn release(&self, tag: &str) -> Result<(), RegistryError> {
        let entry = self
            .lookup(tag)
            .ok_or_else(|| RegistryError::NotFound(tag.to_string()))?;
        let release = entry
            .release_fn()
            .ok_or(RegistryError::CapabilityUnavailable { capability: "release" })?;
        release();
        Ok(())
    }
}

/// Run one probe against a node, recording the outcome on its entry.
pub async fn run_probe(handle: &NodeHandle, probe: &ProbeFn) -> io::Result<Duration> {
    match probe().await {
        Ok(latency) => {
            handle.record_success();
            handle.record_probe_latency(latency);
            Ok(latency)
        }
        Err(e) => {
            handle.record_failure(&e.to_string());
            Err(e)
        }
    }
}
