use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::certs::acme::{AcmeClient, AcmeError, RenewOutcome};
use crate::certs::expiry::{self, CertFileError};
use crate::config::ManagerConfig;
use crate::model::{is_domain, Certificate, CertificateStatus};
use crate::observability::metrics;
use crate::reload::{ApplyError, FragmentChange, OperationResult, ReloadCoordinator, Trigger};
use crate::render::certificate::{
    challenge_fragment_name, render_challenge, render_tls, tls_fragment_name,
};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum CertError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no certificate for {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("ACME client failed: {0}")]
    Acme(#[from] AcmeError),

    #[error("certificate files: {0}")]
    Files(#[from] CertFileError),

    #[error("cannot prepare webroot: {0}")]
    Webroot(std::io::Error),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Engine settings taken from the manager config.
#[derive(Debug, Clone)]
pub struct CertificateSettings {
    pub cert_root: PathBuf,
    pub webroot: PathBuf,
    pub renew_threshold_days: i64,
}

impl CertificateSettings {
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self {
            cert_root: config.paths.cert_root.clone(),
            webroot: config.paths.webroot.clone(),
            renew_threshold_days: config.acme.renew_threshold_days,
        }
    }
}

/// Status of one domain as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateStatusReport {
    pub domain: String,
    /// `None` when no certificate was ever requested.
    pub status: Option<CertificateStatus>,
    pub valid: bool,
    pub days_left: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a batch renewal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewAllReport {
    pub checked: usize,
    pub renewed: usize,
    pub not_due: usize,
    pub failed: Vec<String>,
    pub live_config_changed: bool,
}

impl RenewAllReport {
    pub fn to_result(&self) -> OperationResult {
        let message = format!(
            "{} renewed, {} not due, {} failed",
            self.renewed,
            self.not_due,
            self.failed.len()
        );
        OperationResult {
            success: self.failed.is_empty(),
            message,
            live_config_changed: self.live_config_changed,
        }
    }
}

/// Domain held for the duration of one operation.
struct InFlight<'a> {
    domains: &'a DashSet<String>,
    domain: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.domains.remove(&self.domain);
    }
}

/// Drives issue, renew and revoke, keeping rows and fragments in step.
pub struct CertificateEngine {
    store: Arc<dyn RecordStore>,
    acme: Arc<dyn AcmeClient>,
    coordinator: Arc<ReloadCoordinator>,
    settings: CertificateSettings,
    in_flight: DashSet<String>,
}

impl CertificateEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        acme: Arc<dyn AcmeClient>,
        coordinator: Arc<ReloadCoordinator>,
        settings: CertificateSettings,
    ) -> Self {
        Self {
            store,
            acme,
            coordinator,
            settings,
            in_flight: DashSet::new(),
        }
    }

    fn certificate_path(&self, domain: &str) -> PathBuf {
        self.settings.cert_root.join(domain).join("fullchain.pem")
    }

    fn private_key_path(&self, domain: &str) -> PathBuf {
        self.settings.cert_root.join(domain).join("privkey.pem")
    }

    fn begin(&self, domain: &str) -> Result<InFlight<'_>, CertError> {
        if !self.in_flight.insert(domain.to_string()) {
            return Err(CertError::Conflict(format!(
                "an operation for {} is already running",
                domain
            )));
        }
        Ok(InFlight {
            domains: &self.in_flight,
            domain: domain.to_string(),
        })
    }

    pub async fn issue_certificate(&self, domain: &str, email: &str) -> OperationResult {
        let mut live = false;
        let span = info_span!("certificate", operation = "issue", domain = %domain);
        let result = self.issue(domain, email, &mut live).instrument(span).await;
        report("issue", domain, result.map(|cert| {
            format!(
                "Certificate for {} issued, expires {}",
                cert.domain,
                cert.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default()
            )
        }), live)
    }

    pub async fn renew_certificate(&self, domain: &str) -> OperationResult {
        let mut live = false;
        let span = info_span!("certificate", operation = "renew", domain = %domain);
        let result = self.renew(domain, &mut live).instrument(span).await;
        report("renew", domain, result.map(|outcome| match outcome {
            RenewOutcome::NotDue => format!("Certificate for {} is not yet due for renewal", domain),
            RenewOutcome::Renewed => format!("Certificate for {} renewed", domain),
        }), live)
    }

    pub async fn revoke_certificate(&self, domain: &str) -> OperationResult {
        let mut live = false;
        let span = info_span!("certificate", operation = "revoke", domain = %domain);
        let result = self.revoke(domain, &mut live).instrument(span).await;
        report("revoke", domain, result.map(|()| format!("Certificate for {} revoked", domain)), live)
    }

    pub async fn renew_all_certificates(&self) -> RenewAllReport {
        self.renew_all_at(Utc::now()).await
    }

    /// Renew every active certificate within the threshold at `now`.
    /// Already-expired certificates qualify too.
    pub async fn renew_all_at(&self, now: DateTime<Utc>) -> RenewAllReport {
        let mut batch = RenewAllReport::default();
        let certificates = match self.store.list_certificates().await {
            Ok(certificates) => certificates,
            Err(e) => {
                warn!(error = %e, "Cannot list certificates for renewal");
                batch.failed.push(format!("store: {}", e));
                return batch;
            }
        };

        let due: Vec<_> = certificates
            .into_iter()
            .filter(|cert| cert.status == CertificateStatus::Active)
            .filter(|cert| {
                cert.days_left(now)
                    .is_some_and(|days| days <= self.settings.renew_threshold_days)
            })
            .collect();
        batch.checked = due.len();
        info!(due = due.len(), "Renewal sweep started");

        for cert in due {
            let mut live = false;
            let span = info_span!("certificate", operation = "renew", domain = %cert.domain);
            let result = self.renew(&cert.domain, &mut live).instrument(span).await;
            batch.live_config_changed |= live;
            match result {
                Ok(RenewOutcome::Renewed) => {
                    metrics::record_certificate_operation("renew", "renewed");
                    batch.renewed += 1;
                }
                Ok(RenewOutcome::NotDue) => {
                    metrics::record_certificate_operation("renew", "not_due");
                    batch.not_due += 1;
                }
                Err(e) => {
                    metrics::record_certificate_operation("renew", "failed");
                    warn!(domain = %cert.domain, error = %e, "Renewal failed");
                    batch.failed.push(cert.domain.clone());
                }
            }
        }

        info!(
            renewed = batch.renewed,
            not_due = batch.not_due,
            failed = batch.failed.len(),
            "Renewal sweep finished"
        );
        batch
    }

    pub async fn get_certificate_status(
        &self,
        domain: &str,
    ) -> Result<CertificateStatusReport, CertError> {
        self.status_at(domain, Utc::now()).await
    }

    pub async fn status_at(
        &self,
        domain: &str,
        now: DateTime<Utc>,
    ) -> Result<CertificateStatusReport, CertError> {
        let Some(cert) = self.store.get_certificate_by_domain(domain).await? else {
            return Ok(CertificateStatusReport {
                domain: domain.to_string(),
                status: None,
                valid: false,
                days_left: None,
                expires_at: None,
            });
        };

        let days_left = cert.days_left(now);
        if let Some(days) = days_left {
            metrics::record_days_left(domain, days);
        }
        Ok(CertificateStatusReport {
            domain: cert.domain.clone(),
            status: Some(cert.effective_status(now)),
            valid: cert.is_valid(now),
            days_left,
            expires_at: cert.expires_at,
        })
    }

    async fn issue(&self, domain: &str, email: &str, live: &mut bool) -> Result<Certificate, CertError> {
        if !is_domain(domain) || domain.contains('*') {
            return Err(CertError::Invalid(format!("{:?} is not a domain name", domain)));
        }
        if !email.contains('@') {
            return Err(CertError::Invalid(format!("{:?} is not an email address", email)));
        }

        let _hold = self.begin(domain)?;

        let mut cert = match self.store.get_certificate_by_domain(domain).await? {
            Some(existing) if existing.status == CertificateStatus::Active => {
                return Err(CertError::Conflict(format!(
                    "an active certificate for {} already exists",
                    domain
                )));
            }
            Some(mut existing) => {
                existing.email = email.to_string();
                existing.status = CertificateStatus::Pending;
                existing.certificate_path = None;
                existing.private_key_path = None;
                existing.expires_at = None;
                self.store.update_certificate(existing).await?
            }
            None => {
                self.store
                    .create_certificate(Certificate::pending(domain, email))
                    .await?
            }
        };

        match self.issue_steps(&mut cert, live).await {
            Ok(()) => Ok(cert),
            Err(e) => {
                cert.status = CertificateStatus::Failed;
                if let Err(store_err) = self.store.update_certificate(cert).await {
                    warn!(error = %store_err, "Cannot mark certificate failed");
                }
                if *live {
                    let cleanup = [FragmentChange::remove(challenge_fragment_name(domain))];
                    if let Err(cleanup_err) = self
                        .coordinator
                        .apply_unmanaged(&Trigger::Certificate(domain.to_string()), &cleanup)
                        .await
                    {
                        warn!(error = %cleanup_err, "Cannot remove challenge configuration");
                    }
                }
                Err(e)
            }
        }
    }

    async fn issue_steps(&self, cert: &mut Certificate, live: &mut bool) -> Result<(), CertError> {
        let domain = cert.domain.clone();
        let trigger = Trigger::Certificate(domain.clone());

        tokio::fs::create_dir_all(self.settings.webroot.join(".well-known/acme-challenge"))
            .await
            .map_err(CertError::Webroot)?;

        let challenge = challenge_fragment_name(&domain);
        self.coordinator
            .apply_unmanaged(
                &trigger,
                &[FragmentChange::write(
                    &challenge,
                    render_challenge(&domain, &self.settings.webroot),
                )],
            )
            .await?;
        *live = true;
        info!("Challenge configuration live, requesting certificate");

        self.acme
            .issue(&domain, &cert.email, &self.settings.webroot)
            .await?;

        let cert_path = self.certificate_path(&domain);
        let key_path = self.private_key_path(&domain);
        expiry::verify_private_key(&key_path).await?;
        let expires_at = expiry::read_expiry(&cert_path).await?;

        cert.status = CertificateStatus::Active;
        cert.certificate_path = Some(cert_path.display().to_string());
        cert.private_key_path = Some(key_path.display().to_string());
        cert.expires_at = Some(expires_at);
        *cert = self.store.update_certificate(cert.clone()).await?;

        self.coordinator
            .apply_unmanaged(
                &trigger,
                &[
                    FragmentChange::write(
                        tls_fragment_name(&domain),
                        render_tls(&domain, &cert_path, &key_path),
                    ),
                    FragmentChange::remove(challenge),
                ],
            )
            .await?;
        info!(expires_at = %expires_at, "Certificate active");
        Ok(())
    }

    async fn renew(&self, domain: &str, live: &mut bool) -> Result<RenewOutcome, CertError> {
        let _hold = self.begin(domain)?;
        let mut cert = self
            .store
            .get_certificate_by_domain(domain)
            .await?
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;

        let outcome = self.acme.renew(domain).await?;
        if outcome == RenewOutcome::NotDue {
            info!("Certificate not yet due for renewal");
            return Ok(outcome);
        }

        let cert_path = cert
            .certificate_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.certificate_path(domain));
        let expires_at = expiry::read_expiry(&cert_path).await?;

        cert.status = CertificateStatus::Active;
        cert.expires_at = Some(expires_at);
        self.store.update_certificate(cert).await?;

        self.coordinator.reload_current().await?;
        *live = true;
        info!(expires_at = %expires_at, "Certificate renewed");
        Ok(outcome)
    }

    async fn revoke(&self, domain: &str, live: &mut bool) -> Result<(), CertError> {
        let _hold = self.begin(domain)?;
        let cert = self
            .store
            .get_certificate_by_domain(domain)
            .await?
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;
        let cert_path = cert
            .certificate_path
            .clone()
            .ok_or_else(|| CertError::NotFound(format!("{} (no certificate file recorded)", domain)))?;

        self.acme.revoke(Path::new(&cert_path)).await?;
        self.store.delete_certificate(cert.id).await?;

        self.coordinator
            .apply_unmanaged(
                &Trigger::Certificate(domain.to_string()),
                &[
                    FragmentChange::remove(challenge_fragment_name(domain)),
                    FragmentChange::remove(tls_fragment_name(domain)),
                ],
            )
            .await?;
        *live = true;
        info!("Certificate revoked");
        Ok(())
    }
}

fn report(
    operation: &'static str,
    domain: &str,
    result: Result<String, CertError>,
    live_config_changed: bool,
) -> OperationResult {
    match result {
        Ok(message) => {
            metrics::record_certificate_operation(operation, "success");
            OperationResult::ok(message, live_config_changed)
        }
        Err(e) => {
            metrics::record_certificate_operation(operation, "failed");
            warn!(operation, domain = %domain, error = %e, "Certificate operation failed");
            OperationResult {
                success: false,
                message: e.to_string(),
                live_config_changed,
            }
        }
    }
}
