//! ACME client contract and the certbot implementation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{AcmeConfig, PathsConfig};
use crate::proxy::process::{self, ProcessError};

/// Result of a renewal request that exited cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    /// The ACME client left the certificate alone.
    NotDue,
    /// New files were written; expiry must be re-read.
    Renewed,
}

#[derive(Debug, Error)]
pub enum AcmeError {
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// External ACME client.
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Obtain a certificate for `domain` through HTTP-01 on `webroot`.
    async fn issue(&self, domain: &str, email: &str, webroot: &Path) -> Result<(), AcmeError>;

    async fn renew(&self, cert_name: &str) -> Result<RenewOutcome, AcmeError>;

    async fn revoke(&self, cert_path: &Path) -> Result<(), AcmeError>;
}

/// Phrases certbot prints when nothing needed renewing.
const NOT_DUE_MARKERS: [&str; 2] = ["not yet due for renewal", "no renewals were attempted"];

/// Classify the stdout of a renew run that exited with status 0.
pub fn classify_renewal(stdout: &str) -> RenewOutcome {
    let lower = stdout.to_ascii_lowercase();
    if NOT_DUE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        RenewOutcome::NotDue
    } else {
        RenewOutcome::Renewed
    }
}

/// Drives the `certbot` binary.
#[derive(Debug, Clone)]
pub struct CertbotClient {
    certbot: String,
    timeout: Duration,
    staging: bool,
    /// `--config-dir`, when the cert root is not certbot's default.
    config_dir: Option<PathBuf>,
}

impl CertbotClient {
    pub fn new(acme: &AcmeConfig, paths: &PathsConfig) -> Self {
        let config_dir = paths
            .cert_root
            .parent()
            .filter(|dir| *dir != Path::new("/etc/letsencrypt"))
            .filter(|_| paths.cert_root.ends_with("live"))
            .map(Path::to_path_buf);

        Self {
            certbot: acme.certbot_path.clone(),
            timeout: Duration::from_secs(acme.timeout_secs),
            staging: acme.staging,
            config_dir,
        }
    }

    fn command(&self, subcommand: &str) -> Vec<String> {
        let mut argv = vec![self.certbot.clone(), subcommand.to_string()];
        if let Some(dir) = &self.config_dir {
            argv.push("--config-dir".to_string());
            argv.push(dir.display().to_string());
        }
        argv.push("--non-interactive".to_string());
        argv
    }

    fn issue_argv(&self, domain: &str, email: &str, webroot: &Path) -> Vec<String> {
        let mut argv = self.command("certonly");
        argv.extend(
            [
                "--webroot",
                "-w",
                &webroot.display().to_string(),
                "-d",
                domain,
                "--email",
                email,
                "--agree-tos",
                "--expand",
                "--keep-until-expiring",
            ]
            .map(str::to_string),
        );
        if self.staging {
            argv.push("--staging".to_string());
        }
        argv
    }
}

#[async_trait]
impl AcmeClient for CertbotClient {
    async fn issue(&self, domain: &str, email: &str, webroot: &Path) -> Result<(), AcmeError> {
        info!(domain = %domain, "Requesting certificate");
        process::run_checked(&self.issue_argv(domain, email, webroot), self.timeout).await?;
        Ok(())
    }

    async fn renew(&self, cert_name: &str) -> Result<RenewOutcome, AcmeError> {
        let mut argv = self.command("renew");
        argv.extend(["--cert-name".to_string(), cert_name.to_string()]);
        let output = process::run_checked(&argv, self.timeout).await?;
        Ok(classify_renewal(&output.stdout))
    }

    async fn revoke(&self, cert_path: &Path) -> Result<(), AcmeError> {
        let mut argv = self.command("revoke");
        argv.extend(["--cert-path".to_string(), cert_path.display().to_string()]);
        process::run_checked(&argv, self.timeout).await?;
        Ok(())
    }
}
