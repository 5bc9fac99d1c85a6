//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reload passes, certificate operations, admin requests
//!     → logging.rs: tracing events; each pass runs in a `reload_pass` span
//!       carrying its pass_id, each certificate step in a `certificate` span
//!     → metrics.rs: pass outcomes and durations, certificate outcomes,
//!       days left per domain
//!
//! Sinks:
//!     → stdout, pretty or JSON
//!     → optional Prometheus listener
//! ```

pub mod logging;
pub mod metrics;
