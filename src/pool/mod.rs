//! Failover pool subsystem.
//!
//! # Data Flow
//! ```text
//! connection arrives → Pool::select()
//!     → policy picks a candidate (sequential cursor or uniform random)
//!     → blacklisted entries skipped; expired blacklists cleared lazily
//!     → NodeHandle returned, or PoolExhausted when nothing is usable
//! ```
//!
//! A pool is an immutable view over one node population; it is rebuilt
//! whenever the population changes. Selection tries at most pool-size
//! candidates per request.

pub mod random;
pub mod sequential;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::NodeHandle;

use self::random::Random;
use self::sequential::Sequential;

/// Selection policy for the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    #[default]
    Sequential,
    Random,
}

/// No node in the pool is currently usable.
#[derive(Debug, Error)]
#[error("no usable node in pool")]
pub struct PoolExhausted;

/// A selection strategy over an ordered node list.
pub trait Selector: Send + Sync + std::fmt::Debug {
    fn next_node(&self, nodes: &[NodeHandle]) -> Option<NodeHandle>;
}

/// An ordered node population plus its selection policy.
#[derive(Debug)]
pub struct Pool {
    nodes: Vec<NodeHandle>,
    selector: Box<dyn Selector>,
}

impl Pool {
    pub fn new(nodes: Vec<NodeHandle>, mode: PoolMode) -> Self {
        let selector: Box<dyn Selector> = match mode {
            PoolMode::Sequential => Box::new(Sequential::new()),
            PoolMode::Random => Box::new(Random::new()),
        };
        Self { nodes, selector }
    }

    /// Pick the next usable node. The caller owns the connection-level
    /// failure when every candidate is blacklisted or the pool is empty.
    pub fn select(&self) -> Result<NodeHandle, PoolExhausted> {
        self.selector.next_node(&self.nodes).ok_or(PoolExhausted)
    }

    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Aggregate active-connection count across the population. Drives the
    /// drain wait during reloads.
    pub fn active_connections(&self) -> i64 {
        self.nodes.iter().map(|n| n.active_connections()).sum()
    }
}
