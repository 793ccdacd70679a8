//! Proxy engine boundary.
//!
//! # Data Flow
//! ```text
//! reload → EngineBuilder::build(population)
//!     → BuiltEngine { runtime, per-node probes }
//!     → EngineInstance (lifecycle wrapper: Active → Draining → Closed)
//!     → promoted into the accepting role by the orchestrator
//!
//! accepted connection → EngineInstance::serve
//!     → ProxyEngine::serve (select node, relay, report outcome)
//! ```
//!
//! The runtime that terminates and forwards protocol traffic lives behind
//! the `ProxyEngine` trait; this crate ships a plain TCP relay as the
//! reference implementation (`tcp`).

pub mod adapter;
pub mod instance;
pub mod tcp;

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::registry::ProbeFn;

pub use adapter::{ConnectionGuard, FailurePolicy};
pub use instance::{DrainOutcome, EngineInstance, InstanceState};

/// Errors from building or running an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine build failed: {0}")]
    Build(String),

    #[error("listener bind failed: {0}")]
    Bind(String),

    #[error("engine close failed: {0}")]
    Close(String),
}

/// One running bundle of the proxy engine, bound to a fixed node population.
pub trait ProxyEngine: Send + Sync {
    /// Bring up the engine's own resources (dedicated listeners, dialer
    /// state). Bind conflicts surface as `EngineError::Bind`.
    fn start(&self) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Serve one accepted connection against this engine's population.
    fn serve(&self, stream: TcpStream) -> BoxFuture<'static, ()>;

    /// Stop accepting new connections while existing ones keep being
    /// served. Engines without their own listeners need nothing here.
    fn begin_drain(&self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    /// Release the engine's resources. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<(), EngineError>>;
}

/// Build output: the runtime plus the per-tag probe capabilities it offers.
pub struct BuiltEngine {
    pub engine: Box<dyn ProxyEngine>,
    pub probes: HashMap<String, ProbeFn>,
}

/// Constructs a `ProxyEngine` for a candidate node population.
///
/// The builder receives the pool and the per-node handles so it can wire
/// per-connection success/failure callbacks back into the registry.
pub trait EngineBuilder: Send + Sync {
    fn build(
        &self,
        pool: &std::sync::Arc<crate::pool::Pool>,
        nodes: &[(crate::registry::NodeInfo, crate::registry::NodeHandle)],
    ) -> Result<BuiltEngine, EngineError>;
}
