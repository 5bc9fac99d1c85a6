//! Redirection server blocks.

use crate::model::redirection::REDIRECT_STATUS_CODES;
use crate::model::Redirection;
use crate::render::security::write_tls_settings;
use crate::render::writer::ConfigWriter;
use crate::render::{display_path, parse_target, RenderError, RenderSettings};

pub fn render_redirection(
    redirection: &Redirection,
    settings: &RenderSettings,
) -> Result<String, RenderError> {
    if !REDIRECT_STATUS_CODES.contains(&redirection.status_code) {
        return Err(RenderError::InvalidStatusCode {
            domain: redirection.domain.clone(),
            code: redirection.status_code,
        });
    }
    parse_target(&redirection.domain, &redirection.target_url)?;

    let target = redirection.target_url.trim();
    let location = if redirection.preserve_path {
        format!("{}$request_uri", target.trim_end_matches('/'))
    } else {
        target.to_string()
    };

    let mut w = ConfigWriter::new();
    w.comment(&format!(
        "Managed by proxy-manager: redirection {} ({})",
        redirection.id, redirection.name
    ));
    w.open("server");
    w.directive("listen", "80");
    if redirection.ssl {
        w.directive("listen", "443 ssl");
    }
    w.directive("server_name", &redirection.domain);

    if redirection.ssl {
        w.blank();
        w.directive(
            "ssl_certificate",
            &display_path(&settings.certificate_path(&redirection.domain)),
        );
        w.directive(
            "ssl_certificate_key",
            &display_path(&settings.private_key_path(&redirection.domain)),
        );
        write_tls_settings(&mut w);
    }

    w.blank();
    w.open("location /");
    w.directive("return", &format!("{} {}", redirection.status_code, location));
    w.close();
    w.close();

    Ok(w.finish())
}
