//! Load-balancing upstream pools.

use serde::{Deserialize, Serialize};

use crate::model::{is_duration, FieldError, RecordId};

/// Selection algorithm for an upstream pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancingMethod {
    #[default]
    RoundRobin,
    LeastConn,
    IpHash,
    Hash,
}

impl BalancingMethod {
    /// Methods that pin clients to a server; nginx rejects `backup` with these.
    pub fn is_hashing(self) -> bool {
        matches!(self, BalancingMethod::IpHash | BalancingMethod::Hash)
    }
}

impl std::fmt::Display for BalancingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BalancingMethod::RoundRobin => "round_robin",
            BalancingMethod::LeastConn => "least_conn",
            BalancingMethod::IpHash => "ip_hash",
            BalancingMethod::Hash => "hash",
        };
        f.write_str(name)
    }
}

/// An upstream pool, rendered to `upstream-{id}.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default)]
    pub id: RecordId,

    /// Unique across upstreams; becomes the pool name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub balancing_method: BalancingMethod,

    /// Key expression for `hash`, e.g. `$request_uri`.
    #[serde(default)]
    pub hash_key: Option<String>,

    /// Ordered server list, owned by the upstream.
    #[serde(default)]
    pub servers: Vec<UpstreamServer>,
}

/// One member of an upstream pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamServer {
    #[serde(default)]
    pub id: RecordId,

    #[serde(default)]
    pub upstream_ref: RecordId,

    /// `host:port` or unix socket address.
    pub address: String,

    #[serde(default = "default_one")]
    pub weight: u32,

    #[serde(default = "default_one")]
    pub max_fails: u32,

    #[serde(default = "default_fail_timeout")]
    pub fail_timeout: String,

    #[serde(default)]
    pub is_backup: bool,

    #[serde(default)]
    pub is_down: bool,
}

fn default_one() -> u32 {
    1
}

fn default_fail_timeout() -> String {
    "10s".to_string()
}

impl UpstreamServer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: 0,
            upstream_ref: 0,
            address: address.into(),
            weight: 1,
            max_fails: 1,
            fail_timeout: default_fail_timeout(),
            is_backup: false,
            is_down: false,
        }
    }
}

impl Upstream {
    pub fn new(name: impl Into<String>, method: BalancingMethod) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: String::new(),
            balancing_method: method,
            hash_key: None,
            servers: Vec::new(),
        }
    }

    pub fn with_server(mut self, server: UpstreamServer) -> Self {
        self.servers.push(server);
        self
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if self.balancing_method == BalancingMethod::Hash
            && self.hash_key.as_deref().map_or(true, |k| k.trim().is_empty())
        {
            errors.push(FieldError::new("hash_key", "required for the hash method"));
        }

        for (i, server) in self.servers.iter().enumerate() {
            let field = |name: &str| format!("servers[{}].{}", i, name);
            if server.address.trim().is_empty() || server.address.contains(char::is_whitespace) {
                errors.push(FieldError::new(field("address"), "must be a single host:port"));
            }
            if server.weight < 1 {
                errors.push(FieldError::new(field("weight"), "must be at least 1"));
            }
            if server.max_fails < 1 {
                errors.push(FieldError::new(field("max_fails"), "must be at least 1"));
            }
            if !is_duration(&server.fail_timeout) {
                errors.push(FieldError::new(
                    field("fail_timeout"),
                    "must be a duration such as 10s",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
