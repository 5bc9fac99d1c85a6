//! Upstream pool blocks.

use crate::model::{BalancingMethod, Upstream};
use crate::render::writer::ConfigWriter;
use crate::render::RenderError;

/// Upstream name reduced to characters nginx accepts in a pool name.
pub fn pool_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn render_upstream(upstream: &Upstream, pool: &str) -> Result<String, RenderError> {
    if upstream.servers.is_empty() {
        return Err(RenderError::EmptyUpstream {
            name: upstream.name.clone(),
        });
    }

    let mut w = ConfigWriter::new();
    w.comment(&format!(
        "Managed by proxy-manager: upstream {} ({})",
        upstream.id, upstream.name
    ));
    w.open(&format!("upstream {}", pool));

    match upstream.balancing_method {
        BalancingMethod::RoundRobin => {}
        BalancingMethod::LeastConn => w.line("least_conn;"),
        BalancingMethod::IpHash => w.line("ip_hash;"),
        BalancingMethod::Hash => {
            let key = upstream
                .hash_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or_else(|| RenderError::MissingHashKey {
                    name: upstream.name.clone(),
                })?;
            w.directive("hash", &format!("{} consistent", key));
        }
    }

    for server in &upstream.servers {
        if server.is_backup && upstream.balancing_method.is_hashing() {
            return Err(RenderError::BackupWithHashing {
                name: upstream.name.clone(),
                method: upstream.balancing_method.to_string(),
            });
        }

        let mut line = format!(
            "server {} weight={} max_fails={} fail_timeout={}",
            server.address, server.weight, server.max_fails, server.fail_timeout
        );
        if server.is_backup {
            line.push_str(" backup");
        }
        if server.is_down {
            line.push_str(" down");
        }
        line.push(';');
        w.line(&line);
    }

    w.close();
    Ok(w.finish())
}
