//! Engine instance lifecycle.
//!
//! # States
//! ```text
//! Active → Draining → Closed    (monotonic, no reverse transition)
//! ```
//!
//! At most one instance holds the accepting role per listener outside the
//! brief overlap window of a switch.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use uuid::Uuid;

use crate::pool::Pool;
use crate::registry::{NodeHandle, NodeInfo, ProbeFn};

use super::{EngineError, ProxyEngine};

/// Lifecycle state of an engine instance.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Active = 0,
    Draining = 1,
    Closed = 2,
}

impl From<u8> for InstanceState {
    fn from(val: u8) -> Self {
        match val {
            1 => InstanceState::Draining,
            2 => InstanceState::Closed,
            _ => InstanceState::Active,
        }
    }
}

/// Outcome of waiting for an instance to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every tracked connection closed within the bound.
    Drained { elapsed: Duration },

    /// The bound elapsed first; closure is forced, not treated as an error.
    TimedOut { remaining: i64 },
}

/// One node of an instance's population, with the probe capability the
/// engine offers for it.
pub struct InstanceNode {
    pub info: NodeInfo,
    pub handle: NodeHandle,
    pub probe: Option<ProbeFn>,
}

/// Lifecycle wrapper over one running proxy engine and its fixed population.
pub struct EngineInstance {
    id: Uuid,
    pool: Arc<Pool>,
    nodes: Vec<InstanceNode>,
    engine: Box<dyn ProxyEngine>,
    state: AtomicU8,
    accepting: AtomicBool,
}

impl EngineInstance {
    pub fn new(pool: Arc<Pool>, nodes: Vec<InstanceNode>, engine: Box<dyn ProxyEngine>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pool,
            nodes,
            engine,
            state: AtomicU8::new(InstanceState::Active as u8),
            accepting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn nodes(&self) -> &[InstanceNode] {
        &self.nodes
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.info.tag.as_str())
    }

    pub fn state(&self) -> InstanceState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Start the underlying engine and take the accepting role. A bind
    /// conflict leaves the instance inert and the previous listener intact.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.engine.start().await?;
        self.accepting.store(true, Ordering::Release);
        Ok(())
    }

    /// Dispatch one accepted connection. Dropped silently once the instance
    /// has left the accepting role.
    pub async fn serve(&self, stream: TcpStream) {
        if !self.is_accepting() {
            return;
        }
        self.engine.serve(stream).await;
    }

    /// Stop accepting new connections; existing ones keep being served.
    pub async fn begin_drain(&self) {
        self.accepting.store(false, Ordering::Release);
        self.state
            .fetch_max(InstanceState::Draining as u8, Ordering::AcqRel);
        self.engine.begin_drain().await;
    }

    /// Aggregate active-connection count across this instance's population.
    pub fn active_connections(&self) -> i64 {
        self.nodes.iter().map(|n| n.handle.active_connections()).sum()
    }

    /// Release the engine's resources. Safe to call from any state; the
    /// transition to Closed is monotonic.
    pub async fn close(&self) -> Result<(), EngineError> {
        self.accepting.store(false, Ordering::Release);
        let result = self.engine.close().await;
        self.state
            .fetch_max(InstanceState::Closed as u8, Ordering::AcqRel);
        result
    }
}

impl std::fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineInstance")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("state", &self.state())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}
