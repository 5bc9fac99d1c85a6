//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check command vectors, timeouts and thresholds
//! - Check the admin listener is safe to expose
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ManagerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ManagerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.paths.fragment_dir.as_os_str().is_empty() {
        errors.push(ValidationError::new("paths.fragment_dir", "must not be empty"));
    }
    if config.paths.main_config.file_name().is_none() {
        errors.push(ValidationError::new("paths.main_config", "must name a file"));
    }
    if config.paths.cert_root.as_os_str().is_empty() {
        errors.push(ValidationError::new("paths.cert_root", "must not be empty"));
    }

    if config.proxy.test_command.is_empty() {
        errors.push(ValidationError::new("proxy.test_command", "must not be empty"));
    }
    if config.proxy.reload_command.is_empty() {
        errors.push(ValidationError::new("proxy.reload_command", "must not be empty"));
    }
    if config.proxy.test_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.test_timeout_secs", "must be > 0"));
    }
    if config.proxy.reload_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.reload_timeout_secs", "must be > 0"));
    }

    if config.acme.certbot_path.trim().is_empty() {
        errors.push(ValidationError::new("acme.certbot_path", "must not be empty"));
    }
    if config.acme.timeout_secs == 0 {
        errors.push(ValidationError::new("acme.timeout_secs", "must be > 0"));
    }
    if config.acme.renew_threshold_days < 0 {
        errors.push(ValidationError::new("acme.renew_threshold_days", "must be >= 0"));
    }

    if config.render.max_advanced_config_bytes == 0 {
        errors.push(ValidationError::new("render.max_advanced_config_bytes", "must be > 0"));
    }
    if !crate::model::is_size(&config.render.default_client_max_body_size) {
        errors.push(ValidationError::new(
            "render.default_client_max_body_size",
            format!("invalid size {:?}", config.render.default_client_max_body_size),
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "required when admin is enabled"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
