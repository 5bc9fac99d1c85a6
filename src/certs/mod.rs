//! Certificate lifecycle engine.
//!
//! # Data Flow
//! ```text
//! issue:  row Pending → acme-{domain}.conf + reload → AcmeClient::issue
//!         → verify key, read expiry from fullchain.pem → row Active
//!         → tls-{domain}.conf replaces the challenge fragment + reload
//!         (any failure: row Failed)
//! renew:  AcmeClient::renew → NotDue (no-op) | Renewed → re-read expiry → reload
//! revoke: AcmeClient::revoke → delete row → remove both fragments + reload
//! ```
//!
//! # Design Decisions
//! - Fragment writes go through the reload coordinator, so certificate steps
//!   and record passes never interleave
//! - One operation per domain at a time; a second request gets a conflict
//! - `AcmeClient` is a trait so tests substitute a client writing fixture files

pub mod acme;
pub mod engine;
pub mod expiry;

pub use acme::{AcmeClient, AcmeError, CertbotClient, RenewOutcome};
pub use engine::{
    CertError, CertificateEngine, CertificateSettings, CertificateStatusReport, RenewAllReport,
};
pub use expiry::CertFileError;
