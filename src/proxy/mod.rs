//! Proxy process integration.
//!
//! # Responsibilities
//! - Spawn the proxy's config test and reload commands under a deadline
//! - Gate every reload on a passing config test
//! - Report whether the proxy is running
//!
//! # Design Decisions
//! - `ProxyController` is a trait so tests substitute a fake
//! - No retries: a failed or timed-out command fails the pass

pub mod controller;
pub mod gate;
pub mod process;

pub use controller::{NginxController, ProxyController, ProxyStatus};
pub use gate::{validate, GateError};
pub use process::{CommandOutput, ProcessError};
