//! Reload coordinator.
//!
//! # Data Flow
//! ```text
//! trigger (record mutation, certificate step, signal, store file edit)
//!     → lock (one pass at a time, submission order)
//!     → RecordStore::snapshot → render          (errors: nothing touched)
//!     → Syncing:    capture fragment bytes → sync
//!     → Validating: proxy config test
//!     → Reloading:  proxy reload
//!     → Idle, or Failed → restore captured bytes → Idle
//! ```
//!
//! # Design Decisions
//! - A single mutex spans the whole pass; validation is whole-tree, so
//!   per-resource locks would not make passes independent
//! - Validation runs even when sync changed nothing, to surface external drift
//! - Any failure after Syncing restores the captured bytes, so the directory
//!   always matches what the proxy last accepted
//! - Every result says whether the live configuration changed

pub mod coordinator;
pub mod result;
pub mod state;

pub use coordinator::{FragmentChange, ReloadCoordinator};
pub use result::{ApplyError, OperationResult};
pub use state::{PassState, PassSummary, Trigger};
