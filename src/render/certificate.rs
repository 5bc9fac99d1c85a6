//! Fragments owned by the certificate engine.
//!
//! These are not managed by the sync engine: their names carry no managed
//! prefix, so orphan cleanup never touches them. The certificate engine writes
//! and removes them through the reload coordinator.

use std::path::Path;

use crate::render::security::{write_exploit_block, write_tls_settings, HSTS_HEADER};
use crate::render::writer::ConfigWriter;
use crate::render::display_path;

pub fn challenge_fragment_name(domain: &str) -> String {
    format!("acme-{}.conf", domain)
}

pub fn tls_fragment_name(domain: &str) -> String {
    format!("tls-{}.conf", domain)
}

/// Port 80 block serving HTTP-01 tokens from `webroot` while issuance runs.
pub fn render_challenge(domain: &str, webroot: &Path) -> String {
    let mut w = ConfigWriter::new();
    w.comment(&format!("Managed by proxy-manager: ACME challenge for {}", domain));
    w.open("server");
    w.directive("listen", "80");
    w.directive("server_name", domain);
    w.blank();
    w.open("location ^~ /.well-known/acme-challenge/");
    w.directive("root", &display_path(webroot));
    w.directive("default_type", "\"text/plain\"");
    w.directive("try_files", "$uri =404");
    w.close();
    w.blank();
    w.open("location /");
    w.directive("return", "301 https://$host$request_uri");
    w.close();
    w.close();
    w.finish()
}

/// HTTPS block activating a freshly issued certificate for `domain`.
pub fn render_tls(domain: &str, cert_path: &Path, key_path: &Path) -> String {
    let mut w = ConfigWriter::new();
    w.comment(&format!("Managed by proxy-manager: TLS for {}", domain));
    w.open("server");
    w.directive("listen", "80");
    w.directive("server_name", domain);
    w.open("location /");
    w.directive("return", "301 https://$host$request_uri");
    w.close();
    w.close();
    w.blank();
    w.open("server");
    w.directive("listen", "443 ssl");
    w.directive("server_name", domain);
    w.blank();
    w.directive("ssl_certificate", &display_path(cert_path));
    w.directive("ssl_certificate_key", &display_path(key_path));
    write_tls_settings(&mut w);
    w.line(HSTS_HEADER);
    w.blank();
    write_exploit_block(&mut w);
    w.blank();
    w.open("location /");
    w.directive("return", &format!("200 'TLS certificate active for {}'", domain));
    w.close();
    w.close();
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::is_managed_file_name;

    #[test]
    fn test_names_are_outside_managed_set() {
        assert_eq!(challenge_fragment_name("a.example.com"), "acme-a.example.com.conf");
        assert_eq!(tls_fragment_name("a.example.com"), "tls-a.example.com.conf");
        assert!(!is_managed_file_name(&challenge_fragment_name("a.example.com")));
        assert!(!is_managed_file_name(&tls_fragment_name("a.example.com")));
    }

    #[test]
    fn test_challenge_serves_webroot() {
        let text = render_challenge("a.example.com", Path::new("/var/www/certbot"));
        assert!(text.contains("location ^~ /.well-known/acme-challenge/ {\n        root /var/www/certbot;\n"));
        assert!(text.contains("server_name a.example.com;"));
    }

    #[test]
    fn test_tls_block_points_at_files() {
        let text = render_tls(
            "a.example.com",
            Path::new("/certs/a.example.com/fullchain.pem"),
            Path::new("/certs/a.example.com/privkey.pem"),
        );
        assert!(text.contains("ssl_certificate /certs/a.example.com/fullchain.pem;"));
        assert!(text.contains("ssl_certificate_key /certs/a.example.com/privkey.pem;"));
        assert!(text.contains("listen 443 ssl;"));
        assert!(text.contains("Strict-Transport-Security"));
    }
}
