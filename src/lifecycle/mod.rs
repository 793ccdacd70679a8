//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Wire registry/orchestrator → Initial reload
//!     → Start scheduler, gateway, API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → scheduler stops → in-flight reload aborts or runs
//!     to Closed per the switch rule → active instance closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
