//! Security hardening snippets shared by site blocks.
//!
//! # Responsibilities
//! - Standard response security headers
//! - Deny rules for dotfiles and script extensions the proxied apps never serve
//! - HSTS and TLS protocol settings for 443 blocks

use crate::render::writer::ConfigWriter;

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("X-Frame-Options", "\"SAMEORIGIN\""),
    ("X-XSS-Protection", "\"1; mode=block\""),
    ("X-Content-Type-Options", "\"nosniff\""),
    ("Referrer-Policy", "\"no-referrer-when-downgrade\""),
];

pub const HSTS_HEADER: &str =
    "add_header Strict-Transport-Security \"max-age=31536000; includeSubDomains\" always;";

/// Headers plus exploit-blocking locations, emitted at server level.
pub fn write_exploit_block(w: &mut ConfigWriter) {
    w.comment("Security headers");
    for (name, value) in SECURITY_HEADERS {
        w.line(&format!("add_header {} {} always;", name, value));
    }
    w.blank();
    w.comment("Block common exploits");
    // Dotfiles other than the ACME challenge directory.
    w.open(r"location ~ /\.(?!well-known)");
    w.line("deny all;");
    w.close();
    w.open(r"location ~* \.(aspx?|php|jsp|cgi)$");
    w.line("deny all;");
    w.close();
}

/// TLS protocol settings following the certificate directives.
pub fn write_tls_settings(w: &mut ConfigWriter) {
    w.directive("ssl_protocols", "TLSv1.2 TLSv1.3");
    w.directive(
        "ssl_ciphers",
        "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384",
    );
    w.directive("ssl_prefer_server_ciphers", "off");
    w.directive("ssl_session_cache", "shared:SSL:10m");
    w.directive("ssl_session_timeout", "10m");
}
