//! Network entry point.
//!
//! # Data Flow
//! ```text
//! client connection → Gateway (shared listener, connection limit)
//!     → current EngineInstance (read from the orchestrator's swap pointer)
//!     → engine serve (select node, relay)
//! ```
//!
//! The gateway listener outlives engine instances; a reload repoints the
//! routing target without touching the socket, so there is never a gap
//! where no instance is reachable.

pub mod listener;

pub use listener::Gateway;
