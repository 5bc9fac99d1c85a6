//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the manager.
//! All types derive Serde traits for deserialization from the TOML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy manager.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerConfig {
    /// Filesystem layout shared with the proxy.
    pub paths: PathsConfig,

    /// How the proxy is tested, reloaded and checked for liveness.
    pub proxy: ProxyCommandConfig,

    /// Certificate issuance settings.
    pub acme: AcmeConfig,

    pub render: RenderConfig,

    pub admin: AdminConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Filesystem layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory included by the proxy's main config; holds every fragment.
    pub fragment_dir: PathBuf,

    /// Hand-managed main fragment, edited through the main config editor.
    pub main_config: PathBuf,

    /// Root of `{domain}/fullchain.pem` and `{domain}/privkey.pem`.
    pub cert_root: PathBuf,

    /// HTTP-01 challenge webroot.
    pub webroot: PathBuf,

    /// Directory of per-access-list htpasswd files.
    pub htpasswd_dir: PathBuf,

    /// JSON record store. Records stay in memory only when unset.
    pub store_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            fragment_dir: PathBuf::from("/etc/nginx/conf.d"),
            main_config: PathBuf::from("/etc/nginx/conf.d/default.conf"),
            cert_root: PathBuf::from("/etc/letsencrypt/live"),
            webroot: PathBuf::from("/var/www/certbot"),
            htpasswd_dir: PathBuf::from("/etc/nginx/htpasswd"),
            store_path: None,
        }
    }
}

/// Proxy process contracts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyCommandConfig {
    /// Config test argv. `{fragment_dir}` is substituted.
    pub test_command: Vec<String>,

    /// Graceful reload argv.
    pub reload_command: Vec<String>,

    /// Pid file read by the status check.
    pub pid_file: PathBuf,

    pub test_timeout_secs: u64,

    pub reload_timeout_secs: u64,
}

impl Default for ProxyCommandConfig {
    fn default() -> Self {
        Self {
            test_command: vec!["nginx".to_string(), "-t".to_string()],
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            pid_file: PathBuf::from("/run/nginx.pid"),
            test_timeout_secs: 5,
            reload_timeout_secs: 5,
        }
    }
}

/// Certificate issuance via certbot.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcmeConfig {
    pub certbot_path: String,

    /// Applies to issue, renew and revoke.
    pub timeout_secs: u64,

    /// Active certificates with this many days left or fewer are renewed.
    pub renew_threshold_days: i64,

    /// Period of the background renewal sweep. 0 disables it.
    pub renew_interval_secs: u64,

    /// Use the ACME staging directory.
    pub staging: bool,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            certbot_path: "certbot".to_string(),
            timeout_secs: 120,
            renew_threshold_days: 30,
            renew_interval_secs: 12 * 60 * 60,
            staging: false,
        }
    }
}

/// Renderer limits and defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Body size applied to sites created without one.
    pub default_client_max_body_size: String,

    pub max_advanced_config_bytes: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_client_max_body_size: "1m".to_string(),
            max_advanced_config_bytes: 64 * 1024,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides it.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
