//! Proxied site server blocks.

use std::collections::BTreeMap;

use crate::model::{AccessList, RecordId, Site};
use crate::render::security::{write_exploit_block, write_tls_settings, HSTS_HEADER};
use crate::render::writer::ConfigWriter;
use crate::render::{display_path, parse_target, RenderError, RenderSettings};

/// Where a site's traffic goes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    /// Value for `proxy_pass` in the catch-all location.
    proxy_pass: String,
    /// Scheme and authority only; regex locations may not carry a URI part.
    origin: String,
}

fn resolve_route(site: &Site, pools: &BTreeMap<RecordId, String>) -> Result<Route, RenderError> {
    if let Some(upstream_ref) = site.upstream_ref {
        let pool = pools
            .get(&upstream_ref)
            .ok_or_else(|| RenderError::DanglingUpstream {
                domain: site.domain.clone(),
                upstream_ref,
            })?;
        let target = format!("http://{}", pool);
        return Ok(Route {
            proxy_pass: target.clone(),
            origin: target,
        });
    }

    let target = site
        .target_url
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| RenderError::MissingTarget {
            domain: site.domain.clone(),
        })?;
    let url = parse_target(&site.domain, target)?;

    Ok(Route {
        proxy_pass: target.trim().to_string(),
        origin: url.origin().ascii_serialization(),
    })
}

fn resolve_access_list<'a>(
    site: &Site,
    access_lists: &BTreeMap<RecordId, &'a AccessList>,
) -> Result<Option<&'a AccessList>, RenderError> {
    match site.access_list_ref {
        None => Ok(None),
        Some(id) => access_lists
            .get(&id)
            .copied()
            .map(Some)
            .ok_or_else(|| RenderError::DanglingAccessList {
                domain: site.domain.clone(),
                access_list_ref: id,
            }),
    }
}

pub fn render_site(
    site: &Site,
    pools: &BTreeMap<RecordId, String>,
    access_lists: &BTreeMap<RecordId, &AccessList>,
    settings: &RenderSettings,
) -> Result<String, RenderError> {
    let route = resolve_route(site, pools)?;
    let access_list = resolve_access_list(site, access_lists)?;

    if let Some(advanced) = &site.advanced_config_text {
        if advanced.len() > settings.max_advanced_config_bytes {
            return Err(RenderError::AdvancedConfigTooLarge {
                domain: site.domain.clone(),
                size: advanced.len(),
                limit: settings.max_advanced_config_bytes,
            });
        }
    }

    let force_https = site.ssl && site.ssl_forced;

    let mut w = ConfigWriter::new();
    w.comment(&format!(
        "Managed by proxy-manager: site {} ({})",
        site.id, site.name
    ));

    if !force_https {
        w.open("server");
        w.directive("listen", "80");
        w.directive("server_name", &site.domain);
        w.blank();
        write_acme_location(&mut w, settings);
        write_body(&mut w, site, &route, access_list, settings);
        w.close();
    }

    if site.ssl {
        if !force_https {
            w.blank();
        }
        w.open("server");
        let listen = if site.http2_support {
            "443 ssl http2"
        } else {
            "443 ssl"
        };
        w.directive("listen", listen);
        w.directive("server_name", &site.domain);
        w.blank();
        w.directive(
            "ssl_certificate",
            &display_path(&settings.certificate_path(&site.domain)),
        );
        w.directive(
            "ssl_certificate_key",
            &display_path(&settings.private_key_path(&site.domain)),
        );
        write_tls_settings(&mut w);
        if site.hsts_enabled {
            w.line(HSTS_HEADER);
        }
        w.blank();
        write_body(&mut w, site, &route, access_list, settings);
        w.close();
    }

    if force_https {
        w.blank();
        w.comment("Force HTTPS redirect");
        w.open("server");
        w.directive("listen", "80");
        w.directive("server_name", &site.domain);
        w.blank();
        write_acme_location(&mut w, settings);
        w.open("location /");
        w.directive("return", "301 https://$host$request_uri");
        w.close();
        w.close();
    }

    Ok(w.finish())
}

/// Keeps HTTP-01 renewals working through the site's own port 80 block.
fn write_acme_location(w: &mut ConfigWriter, settings: &RenderSettings) {
    w.open("location ^~ /.well-known/acme-challenge/");
    w.directive("root", &display_path(&settings.webroot));
    w.close();
}

fn write_body(
    w: &mut ConfigWriter,
    site: &Site,
    route: &Route,
    access_list: Option<&AccessList>,
    settings: &RenderSettings,
) {
    w.directive("client_max_body_size", &site.client_max_body_size);

    if site.block_exploits {
        w.blank();
        write_exploit_block(w);
    }

    if let Some(list) = access_list {
        w.blank();
        write_access_list(w, list, settings);
    }

    if site.caching_enabled {
        w.blank();
        w.open(r"location ~* \.(?:css|js|jpe?g|png|gif|ico|svg|webp|woff2?)$");
        w.directive("proxy_pass", &route.origin);
        w.directive("proxy_set_header", "Host $host");
        w.directive("expires", "30d");
        w.line("add_header Cache-Control \"public, max-age=2592000\";");
        w.close();
    }

    w.blank();
    w.open("location /");
    w.directive("proxy_pass", &route.proxy_pass);
    w.directive("proxy_http_version", "1.1");
    w.directive("proxy_set_header", "Host $host");
    w.directive("proxy_set_header", "X-Real-IP $remote_addr");
    w.directive("proxy_set_header", "X-Forwarded-For $proxy_add_x_forwarded_for");
    w.directive("proxy_set_header", "X-Forwarded-Proto $scheme");
    if access_list.is_some_and(|list| list.requires_auth() && !list.pass_auth) {
        w.directive("proxy_set_header", "Authorization \"\"");
    }
    w.directive("proxy_connect_timeout", "30s");
    w.directive("proxy_send_timeout", "30s");
    w.directive("proxy_read_timeout", "30s");
    w.close();

    if let Some(advanced) = site.advanced_config_text.as_deref() {
        if !advanced.trim().is_empty() {
            w.blank();
            w.comment("Advanced configuration");
            w.raw(advanced);
        }
    }
}

fn write_access_list(w: &mut ConfigWriter, list: &AccessList, settings: &RenderSettings) {
    w.comment(&format!("Access list {} ({})", list.id, list.name));

    let mut has_allow = false;
    for client in &list.clients {
        if let Some(address) = &client.address {
            w.directive(client.directive.as_str(), address);
            has_allow |= client.directive == crate::model::Directive::Allow;
        }
    }
    if has_allow {
        w.directive("deny", "all");
    }

    if list.requires_auth() {
        w.directive("auth_basic", &format!("\"{}\"", list.name.replace('"', "'")));
        let file = settings
            .htpasswd_dir
            .join(format!("access-list-{}", list.id));
        w.directive("auth_basic_user_file", &display_path(&file));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccessListClient, Directive};
    use std::path::PathBuf;

    fn settings() -> RenderSettings {
        RenderSettings {
            cert_root: PathBuf::from("/etc/letsencrypt/live"),
            webroot: PathBuf::from("/var/www/certbot"),
            htpasswd_dir: PathBuf::from("/etc/nginx/htpasswd"),
            max_advanced_config_bytes: 64,
        }
    }

    fn target_site() -> Site {
        let mut site = Site::new("app", "app.example.com");
        site.id = 5;
        site.target_url = Some("http://10.0.0.5:3000/app".into());
        site
    }

    fn render(site: &Site) -> Result<String, RenderError> {
        render_site(site, &BTreeMap::new(), &BTreeMap::new(), &settings())
    }

    #[test]
    fn test_plain_http_site() {
        let text = render(&target_site()).unwrap();
        assert!(text.starts_with("# Managed by proxy-manager: site 5 (app)\nserver {\n    listen 80;\n"));
        assert!(text.contains("    server_name app.example.com;\n"));
        assert!(text.contains("        proxy_pass http://10.0.0.5:3000/app;\n"));
        assert!(text.contains("    client_max_body_size 1m;\n"));
        assert!(text.contains("X-Frame-Options"));
        assert!(!text.contains("listen 443"));
    }

    #[test]
    fn test_upstream_wins_over_target() {
        let mut site = target_site();
        site.upstream_ref = Some(1);
        let pools = BTreeMap::from([(1, "api".to_string())]);

        let text = render_site(&site, &pools, &BTreeMap::new(), &settings()).unwrap();
        assert!(text.contains("proxy_pass http://api;"));
        assert!(!text.contains("10.0.0.5"));
    }

    #[test]
    fn test_tls_block_and_forced_redirect() {
        let mut site = target_site();
        site.ssl = true;
        site.ssl_forced = true;
        site.hsts_enabled = true;
        site.caching_enabled = true;

        let text = render(&site).unwrap();
        assert!(text.contains("listen 443 ssl http2;"));
        assert!(text.contains("ssl_certificate /etc/letsencrypt/live/app.example.com/fullchain.pem;"));
        assert!(text.contains("ssl_certificate_key /etc/letsencrypt/live/app.example.com/privkey.pem;"));
        assert!(text.contains("Strict-Transport-Security"));
        assert!(text.contains("return 301 https://$host$request_uri;"));
        // Regex location proxies to the origin only.
        assert!(text.contains("        proxy_pass http://10.0.0.5:3000;\n"));
        // Only one port 80 block, and it comes after the TLS block.
        assert_eq!(text.matches("listen 80;").count(), 1);
        assert!(text.find("listen 443").unwrap() < text.find("listen 80;").unwrap());
    }

    #[test]
    fn test_ssl_forced_without_ssl_is_ignored() {
        let mut site = target_site();
        site.ssl_forced = true;
        let text = render(&site).unwrap();
        assert!(!text.contains("return 301"));
        assert!(text.contains("proxy_pass http://10.0.0.5:3000/app;"));
    }

    #[test]
    fn test_advanced_config_verbatim_and_limited() {
        let mut site = target_site();
        site.block_exploits = false;
        site.advanced_config_text = Some("location /ws {\n  proxy_pass http://x;\n}".into());
        let text = render(&site).unwrap();
        assert!(text.contains("location /ws {\n  proxy_pass http://x;\n}\n"));

        site.advanced_config_text = Some("#".repeat(65));
        assert!(matches!(
            render(&site),
            Err(RenderError::AdvancedConfigTooLarge { size: 65, limit: 64, .. })
        ));
    }

    #[test]
    fn test_access_list_rules() {
        let mut site = target_site();
        site.access_list_ref = Some(8);
        let list = AccessList {
            id: 8,
            name: "office".into(),
            description: String::new(),
            pass_auth: false,
            clients: vec![
                AccessListClient {
                    username: None,
                    password: None,
                    address: Some("10.0.0.0/8".into()),
                    directive: Directive::Allow,
                },
                AccessListClient {
                    username: Some("ops".into()),
                    password: Some("secret".into()),
                    address: None,
                    directive: Directive::Allow,
                },
            ],
        };
        let lists = BTreeMap::from([(8, &list)]);

        let text = render_site(&site, &BTreeMap::new(), &lists, &settings()).unwrap();
        assert!(text.contains("    allow 10.0.0.0/8;\n    deny all;\n"));
        assert!(text.contains("auth_basic_user_file /etc/nginx/htpasswd/access-list-8;"));
        assert!(text.contains("proxy_set_header Authorization \"\";"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_dangling_access_list() {
        let mut site = target_site();
        site.access_list_ref = Some(99);
        assert!(matches!(
            render(&site),
            Err(RenderError::DanglingAccessList { access_list_ref: 99, .. })
        ));
    }
}
