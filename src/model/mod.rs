//! Declarative records the proxy configuration is rendered from.
//!
//! # Data Flow
//! ```text
//! admin API / store file
//!     → record types (this module, serde)
//!     → validate() (field-level checks, all errors collected)
//!     → store (ids, uniqueness, cascade)
//!     → Snapshot (consistent view of every table)
//!     → render
//! ```
//!
//! # Design Decisions
//! - Ids are opaque `i64` values assigned by the store; `0` means "not yet stored"
//! - Record validation is local to one record; cross-record integrity (dangling
//!   references, duplicate domains) is the renderer's job
//! - `Certificate` status `expired` is never stored, only computed

pub mod access_list;
pub mod certificate;
pub mod redirection;
pub mod site;
pub mod upstream;

pub use access_list::{AccessList, AccessListClient, Directive};
pub use certificate::{Certificate, CertificateStatus};
pub use redirection::Redirection;
pub use site::Site;
pub use upstream::{BalancingMethod, Upstream, UpstreamServer};

use serde::{Deserialize, Serialize};

/// Opaque record identifier assigned by the store.
pub type RecordId = i64;

/// A single field-level problem with a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Consistent view of every table, taken under a single store read lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub sites: Vec<Site>,
    pub upstreams: Vec<Upstream>,
    pub redirections: Vec<Redirection>,
    pub access_lists: Vec<AccessList>,
}

/// Returns true for nginx time strings such as `10s`, `500ms` or `30`.
pub(crate) fn is_duration(value: &str) -> bool {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    matches!(
        &value[digits..],
        "" | "ms" | "s" | "m" | "h" | "d" | "w" | "M" | "y"
    )
}

/// Returns true for nginx size strings such as `1m`, `512k` or `0`.
pub(crate) fn is_size(value: &str) -> bool {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    matches!(&value[digits..], "" | "k" | "K" | "m" | "M" | "g" | "G")
}

/// Hostnames accepted as `server_name` values. A `*` may only stand alone as
/// a whole label.
pub(crate) fn is_domain(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(is_label)
        && value.split('.').any(|label| label != "*")
}

fn is_label(label: &str) -> bool {
    if label == "*" {
        return true;
    }
    label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().any(|c| c.is_ascii_alphanumeric())
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_strings() {
        assert!(is_duration("10s"));
        assert!(is_duration("500ms"));
        assert!(is_duration("30"));
        assert!(!is_duration("s"));
        assert!(!is_duration("10 s"));
        assert!(!is_duration("10sec"));
    }

    #[test]
    fn test_size_strings() {
        assert!(is_size("1m"));
        assert!(is_size("0"));
        assert!(is_size("512k"));
        assert!(!is_size("1mb"));
        assert!(!is_size(""));
    }

    #[test]
    fn test_domain_strings() {
        assert!(is_domain("api.example.com"));
        assert!(is_domain("*.example.com"));
        assert!(!is_domain("api.example.com; return 200"));
        assert!(!is_domain(""));
    }

    #[test]
    fn test_domain_labels() {
        assert!(is_domain("my-app.example.com"));
        assert!(is_domain("_dmarc.example.com"));
        assert!(is_domain("localhost"));
        let rejected = [
            "..",
            "-",
            "_",
            ".",
            "*",
            "a..b",
            ".example.com",
            "example.com.",
            "-api.example.com",
            "api-.example.com",
            "a*.example.com",
        ];
        for bad in rejected {
            assert!(!is_domain(bad), "{} accepted", bad);
        }
        assert!(!is_domain(&format!("{}.com", "a".repeat(64))));
    }
}
