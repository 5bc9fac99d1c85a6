//! Domain-level HTTP redirects.

use serde::{Deserialize, Serialize};

use crate::model::{is_domain, FieldError, RecordId};

/// Status codes nginx can issue with `return <code> <url>`.
pub const REDIRECT_STATUS_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// A redirect host, rendered to `redirect-{id}.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirection {
    #[serde(default)]
    pub id: RecordId,

    pub name: String,

    pub domain: String,

    pub target_url: String,

    #[serde(default)]
    pub ssl: bool,

    #[serde(default = "default_preserve_path")]
    pub preserve_path: bool,

    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

fn default_preserve_path() -> bool {
    true
}

fn default_status_code() -> u16 {
    302
}

impl Redirection {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        target_url: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            domain: domain.into(),
            target_url: target_url.into(),
            ssl: false,
            preserve_path: default_preserve_path(),
            status_code: default_status_code(),
        }
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if !is_domain(&self.domain) {
            errors.push(FieldError::new("domain", "must be a valid hostname"));
        }
        if self.target_url.trim().is_empty() {
            errors.push(FieldError::new("target_url", "must not be empty"));
        }
        if !REDIRECT_STATUS_CODES.contains(&self.status_code) {
            errors.push(FieldError::new(
                "status_code",
                format!("must be one of {:?}", REDIRECT_STATUS_CODES),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
