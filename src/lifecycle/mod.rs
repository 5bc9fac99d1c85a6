//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → build store, controller, coordinator, engine
//!     → startup pass → background tasks → admin listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → admin listener drains → background tasks stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Re-render and apply every record
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Manager, StartupError};
