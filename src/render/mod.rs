//! Configuration renderer.
//!
//! # Data Flow
//! ```text
//! Snapshot (sites, upstreams, redirections, access lists)
//!     → integrity checks (references, domains, pool names)
//!     → upstream.rs  → upstream-{id}.conf
//!     → site.rs      → site-{id}.conf
//!     → redirect.rs  → redirect-{id}.conf
//!     → Fragments (BTreeMap, ordered)
//!
//! Certificate engine:
//!     → certificate.rs → acme-{domain}.conf / tls-{domain}.conf
//! ```
//!
//! # Design Decisions
//! - Pure functions of their input: no clock, no filesystem, no randomness, so
//!   identical snapshots render byte-identical text
//! - Integrity problems fail the whole render before anything touches disk;
//!   a dangling pool name is valid nginx syntax and would slip through `nginx -t`
//! - `advanced_config_text` is passed through verbatim, only its size is checked

pub mod certificate;
pub mod fragment;
pub mod redirect;
pub mod security;
pub mod site;
pub mod upstream;
pub mod writer;

pub use fragment::{is_managed_file_name, FragmentKey, FragmentKind, Fragments};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

use crate::config::ManagerConfig;
use crate::model::{RecordId, Snapshot};

/// Integrity errors detected while rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("site {domain} has neither a target URL nor an upstream")]
    MissingTarget { domain: String },

    #[error("site {domain} references upstream {upstream_ref}, which does not exist")]
    DanglingUpstream { domain: String, upstream_ref: RecordId },

    #[error("site {domain} references access list {access_list_ref}, which does not exist")]
    DanglingAccessList {
        domain: String,
        access_list_ref: RecordId,
    },

    #[error("{domain}: invalid target URL {target:?}: {reason}")]
    InvalidTarget {
        domain: String,
        target: String,
        reason: String,
    },

    #[error("upstream {name} has no servers")]
    EmptyUpstream { name: String },

    #[error("upstream {name} uses the hash method without a hash key")]
    MissingHashKey { name: String },

    #[error("upstream {name}: backup servers cannot be combined with {method}")]
    BackupWithHashing { name: String, method: String },

    #[error("upstream pool name {pool} is used by more than one upstream")]
    DuplicatePoolName { pool: String },

    #[error("domain {domain} is served by more than one site or redirection")]
    DuplicateDomain { domain: String },

    #[error("site {domain}: advanced config is {size} bytes, limit is {limit}")]
    AdvancedConfigTooLarge {
        domain: String,
        size: usize,
        limit: usize,
    },

    #[error("redirection {domain}: status code {code} is not a redirect")]
    InvalidStatusCode { domain: String, code: u16 },
}

/// Paths and limits the renderer needs besides the records themselves.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Root of `{domain}/fullchain.pem` and `{domain}/privkey.pem`.
    pub cert_root: PathBuf,
    /// ACME HTTP-01 webroot.
    pub webroot: PathBuf,
    /// Directory of `access-list-{id}` htpasswd files.
    pub htpasswd_dir: PathBuf,
    pub max_advanced_config_bytes: usize,
}

impl RenderSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            cert_root: config.paths.cert_root.clone(),
            webroot: config.paths.webroot.clone(),
            htpasswd_dir: config.paths.htpasswd_dir.clone(),
            max_advanced_config_bytes: config.render.max_advanced_config_bytes,
        }
    }

    pub fn certificate_path(&self, domain: &str) -> PathBuf {
        self.cert_root.join(domain).join("fullchain.pem")
    }

    pub fn private_key_path(&self, domain: &str) -> PathBuf {
        self.cert_root.join(domain).join("privkey.pem")
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from_config(&ManagerConfig::default())
    }
}

/// Render the complete managed fragment set for `snapshot`.
pub fn render(snapshot: &Snapshot, settings: &RenderSettings) -> Result<Fragments, RenderError> {
    check_domains(snapshot)?;
    let pools = pool_names(snapshot)?;

    let access_lists: BTreeMap<_, _> = snapshot
        .access_lists
        .iter()
        .map(|list| (list.id, list))
        .collect();

    let mut fragments = Fragments::new();

    for upstream in &snapshot.upstreams {
        let text = upstream::render_upstream(upstream, &upstream::pool_name(&upstream.name))?;
        fragments.insert(FragmentKey::upstream(upstream.id), text);
    }

    for site in &snapshot.sites {
        let text = site::render_site(site, &pools, &access_lists, settings)?;
        fragments.insert(FragmentKey::site(site.id), text);
    }

    for redirection in &snapshot.redirections {
        let text = redirect::render_redirection(redirection, settings)?;
        fragments.insert(FragmentKey::redirect(redirection.id), text);
    }

    Ok(fragments)
}

fn check_domains(snapshot: &Snapshot) -> Result<(), RenderError> {
    let mut seen = BTreeSet::new();
    let domains = snapshot
        .sites
        .iter()
        .map(|s| &s.domain)
        .chain(snapshot.redirections.iter().map(|r| &r.domain));

    for domain in domains {
        if !seen.insert(domain.to_ascii_lowercase()) {
            return Err(RenderError::DuplicateDomain {
                domain: domain.clone(),
            });
        }
    }
    Ok(())
}

/// Maps upstream id to its nginx pool name, rejecting collisions.
fn pool_names(snapshot: &Snapshot) -> Result<BTreeMap<RecordId, String>, RenderError> {
    let mut pools = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for upstream in &snapshot.upstreams {
        let pool = upstream::pool_name(&upstream.name);
        if !seen.insert(pool.clone()) {
            return Err(RenderError::DuplicatePoolName { pool });
        }
        pools.insert(upstream.id, pool);
    }
    Ok(pools)
}

/// Parse a proxy or redirect target; only absolute http(s) URLs with a host pass.
pub(crate) fn parse_target(domain: &str, target: &str) -> Result<Url, RenderError> {
    let invalid = |reason: String| RenderError::InvalidTarget {
        domain: domain.to_string(),
        target: target.to_string(),
        reason,
    };

    let url = Url::parse(target.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if target.contains(|c: char| c.is_whitespace() || c == ';' || c == '{' || c == '}') {
        return Err(invalid("contains directive syntax".to_string()));
    }
    Ok(url)
}

pub(crate) fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BalancingMethod, Redirection, Site, Upstream, UpstreamServer};

    fn settings() -> RenderSettings {
        RenderSettings {
            cert_root: PathBuf::from("/etc/letsencrypt/live"),
            webroot: PathBuf::from("/var/www/certbot"),
            htpasswd_dir: PathBuf::from("/etc/nginx/htpasswd"),
            max_advanced_config_bytes: 1024,
        }
    }

    fn snapshot() -> Snapshot {
        let mut upstream = Upstream::new("api", BalancingMethod::RoundRobin)
            .with_server(UpstreamServer::new("10.0.0.1:8080"));
        upstream.id = 1;

        let mut site = Site::new("api", "api.example.com");
        site.id = 2;
        site.upstream_ref = Some(1);

        let mut redirection = Redirection::new("old", "old.example.com", "https://new.example.com");
        redirection.id = 3;

        Snapshot {
            sites: vec![site],
            upstreams: vec![upstream],
            redirections: vec![redirection],
            access_lists: vec![],
        }
    }

    #[test]
    fn test_one_fragment_per_record() {
        let fragments = render(&snapshot(), &settings()).unwrap();
        let names: Vec<_> = fragments.keys().map(|k| k.file_name()).collect();
        assert_eq!(names, vec!["upstream-1.conf", "site-2.conf", "redirect-3.conf"]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let snapshot = snapshot();
        let first = render(&snapshot, &settings()).unwrap();
        let second = render(&snapshot.clone(), &settings()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_site_without_target_rejected() {
        let mut snapshot = snapshot();
        let mut site = Site::new("x", "x.example.com");
        site.id = 9;
        snapshot.sites.push(site);

        let err = render(&snapshot, &settings()).unwrap_err();
        assert_eq!(
            err,
            RenderError::MissingTarget {
                domain: "x.example.com".into()
            }
        );
    }

    #[test]
    fn test_deleted_upstream_still_referenced() {
        let mut snapshot = snapshot();
        snapshot.upstreams.clear();
        let err = render(&snapshot, &settings()).unwrap_err();
        assert!(matches!(err, RenderError::DanglingUpstream { upstream_ref: 1, .. }));
    }

    #[test]
    fn test_domain_shared_by_site_and_redirection() {
        let mut snapshot = snapshot();
        snapshot.redirections[0].domain = "API.example.com".into();
        let err = render(&snapshot, &settings()).unwrap_err();
        assert!(matches!(err, RenderError::DuplicateDomain { .. }));
    }

    #[test]
    fn test_pool_name_collision() {
        let mut snapshot = snapshot();
        let mut other = Upstream::new("api!", BalancingMethod::RoundRobin)
            .with_server(UpstreamServer::new("10.0.0.2:8080"));
        other.id = 7;
        snapshot.upstreams.push(other);
        // "api!" sanitizes to "api_", which does not collide.
        assert!(render(&snapshot, &settings()).is_ok());

        snapshot.upstreams[1].name = "api".into();
        let err = render(&snapshot, &settings()).unwrap_err();
        assert_eq!(err, RenderError::DuplicatePoolName { pool: "api".into() });
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target("a", "http://10.0.0.1:8080").is_ok());
        assert!(parse_target("a", "https://backend.internal/app").is_ok());
        assert!(parse_target("a", "ftp://files").is_err());
        assert!(parse_target("a", "localhost:3000").is_err());
        assert!(parse_target("a", "http://a;return 200").is_err());
    }
}
