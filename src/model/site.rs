//! Proxied virtual host.

use serde::{Deserialize, Serialize};

use crate::model::{is_domain, is_size, FieldError, RecordId};

/// A proxied virtual host, rendered to `site-{id}.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub id: RecordId,

    pub name: String,

    /// Unique across sites; used as `server_name`.
    pub domain: String,

    /// Proxy target used when no upstream is referenced.
    #[serde(default)]
    pub target_url: Option<String>,

    /// Upstream pool to route to. Takes precedence over `target_url`.
    #[serde(default)]
    pub upstream_ref: Option<RecordId>,

    #[serde(default)]
    pub ssl: bool,

    /// Redirect plain HTTP to HTTPS. Only honoured together with `ssl`.
    #[serde(default)]
    pub ssl_forced: bool,

    #[serde(default)]
    pub hsts_enabled: bool,

    #[serde(default = "default_true")]
    pub http2_support: bool,

    #[serde(default = "default_true")]
    pub block_exploits: bool,

    #[serde(default)]
    pub caching_enabled: bool,

    #[serde(default = "default_body_size")]
    pub client_max_body_size: String,

    #[serde(default)]
    pub access_list_ref: Option<RecordId>,

    /// Free-form directives appended verbatim inside the server block.
    #[serde(default)]
    pub advanced_config_text: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_body_size() -> String {
    "1m".to_string()
}

impl Site {
    /// A site for `domain` with defaults matching a freshly created record.
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            domain: domain.into(),
            target_url: None,
            upstream_ref: None,
            ssl: false,
            ssl_forced: false,
            hsts_enabled: false,
            http2_support: true,
            block_exploits: true,
            caching_enabled: false,
            client_max_body_size: default_body_size(),
            access_list_ref: None,
            advanced_config_text: None,
        }
    }

    /// Field-level checks. Reference integrity is checked at render time.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if !is_domain(&self.domain) {
            errors.push(FieldError::new("domain", "must be a valid hostname"));
        }
        if !is_size(&self.client_max_body_size) {
            errors.push(FieldError::new(
                "client_max_body_size",
                "must be a size such as 1m or 512k",
            ));
        }
        if let Some(target) = &self.target_url {
            if target.trim().is_empty() {
                errors.push(FieldError::new("target_url", "must not be blank when set"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let site: Site = serde_json::from_str(
            r#"{"name":"api","domain":"api.example.com","target_url":"http://10.0.0.1:8080"}"#,
        )
        .unwrap();
        assert_eq!(site.id, 0);
        assert!(site.http2_support);
        assert!(site.block_exploits);
        assert!(!site.ssl);
        assert_eq!(site.client_max_body_size, "1m");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut site = Site::new("", "bad domain");
        site.client_max_body_size = "lots".into();
        let errors = site.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
