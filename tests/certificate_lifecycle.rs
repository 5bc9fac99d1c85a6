//! Issue, renew and revoke against a stub ACME client writing real PEM files.

use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};

use proxy_manager::certs::RenewOutcome;
use proxy_manager::model::{Certificate, CertificateStatus};
use proxy_manager::store::RecordStore;

mod common;
use common::Harness;

const DOMAIN: &str = "shop.example.com";
const EMAIL: &str = "ops@example.com";

async fn issued(h: &Harness) -> Certificate {
    let result = h.engine.issue_certificate(DOMAIN, EMAIL).await;
    assert!(result.success, "{}", result.message);
    h.store
        .get_certificate_by_domain(DOMAIN)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_issue_activates_certificate_and_swaps_fragments() {
    let h = Harness::new();

    let result = h.engine.issue_certificate(DOMAIN, EMAIL).await;

    assert!(result.success, "{}", result.message);
    assert!(result.live_config_changed);
    assert!(h.acme.saw_challenge.load(Ordering::SeqCst));

    let cert = h
        .store
        .get_certificate_by_domain(DOMAIN)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cert.status, CertificateStatus::Active);
    assert!(cert
        .certificate_path
        .as_deref()
        .unwrap()
        .ends_with("shop.example.com/fullchain.pem"));
    let days = cert.days_left(Utc::now()).unwrap();
    assert!((89..=90).contains(&days), "days left: {}", days);

    let files = h.files();
    assert!(files.contains("tls-shop.example.com.conf"));
    assert!(!files.contains("acme-shop.example.com.conf"));
    let tls = h.read("tls-shop.example.com.conf");
    assert!(tls.contains("ssl_certificate "));
    assert!(tls.contains("live/shop.example.com/privkey.pem"));
    // Challenge pass, then certificate pass.
    assert_eq!(h.proxy.reloads(), 2);
}

#[tokio::test]
async fn test_issue_rejects_active_duplicate() {
    let h = Harness::new();
    issued(&h).await;

    let again = h.engine.issue_certificate(DOMAIN, EMAIL).await;

    assert!(!again.success);
    assert!(again.message.contains("already exists"));
    assert_eq!(h.acme.issued.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_issue_rejects_bad_input_without_creating_rows() {
    let h = Harness::new();

    assert!(!h.engine.issue_certificate("*.example.com", EMAIL).await.success);
    for bad in ["..", "-", "_", "../etc"] {
        let result = h.engine.issue_certificate(bad, EMAIL).await;
        assert!(!result.success, "{} accepted", bad);
        assert!(result.message.contains("is not a domain name"));
    }
    assert!(!h.engine.issue_certificate(DOMAIN, "not-an-email").await.success);

    assert!(h.store.list_certificates().await.unwrap().is_empty());
    assert_eq!(h.proxy.tests(), 0);
}

#[tokio::test]
async fn test_acme_failure_marks_row_failed_and_cleans_up() {
    let h = Harness::new();
    h.acme.fail_issue.store(true, Ordering::SeqCst);

    let result = h.engine.issue_certificate(DOMAIN, EMAIL).await;

    assert!(!result.success);
    assert!(result.message.contains("Challenge failed"));
    let cert = h
        .store
        .get_certificate_by_domain(DOMAIN)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cert.status, CertificateStatus::Failed);
    assert!(cert.expires_at.is_none());
    assert!(!h.files().contains("acme-shop.example.com.conf"));
    assert!(!h.files().contains("tls-shop.example.com.conf"));

    // A retry reuses the failed row.
    h.acme.fail_issue.store(false, Ordering::SeqCst);
    let retried = issued(&h).await;
    assert_eq!(retried.id, cert.id);
    assert_eq!(retried.status, CertificateStatus::Active);
}

#[tokio::test]
async fn test_renew_not_due_changes_nothing() {
    let h = Harness::new();
    let before = issued(&h).await;
    let reloads = h.proxy.reloads();

    let result = h.engine.renew_certificate(DOMAIN).await;

    assert!(result.success);
    assert!(!result.live_config_changed);
    assert!(result.message.contains("not yet due"));
    let after = h
        .store
        .get_certificate_by_domain(DOMAIN)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.expires_at, before.expires_at);
    assert_eq!(h.proxy.reloads(), reloads);
}

#[tokio::test]
async fn test_renew_rereads_expiry_and_reloads() {
    let h = Harness::new();
    let before = issued(&h).await;
    *h.acme.renew_outcome.lock().unwrap() = RenewOutcome::Renewed;

    let result = h.engine.renew_certificate(DOMAIN).await;

    assert!(result.success, "{}", result.message);
    assert!(result.live_config_changed);
    let after = h
        .store
        .get_certificate_by_domain(DOMAIN)
        .await
        .unwrap()
        .unwrap();
    assert!(after.expires_at.unwrap() > before.expires_at.unwrap());
    let days = after.days_left(Utc::now()).unwrap();
    assert!((119..=120).contains(&days), "days left: {}", days);
}

#[tokio::test]
async fn test_renew_unknown_domain_fails() {
    let h = Harness::new();
    let result = h.engine.renew_certificate("nobody.example.com").await;
    assert!(!result.success);
    assert!(result.message.contains("nobody.example.com"));
}

#[tokio::test]
async fn test_revoke_removes_row_and_fragments() {
    let h = Harness::new();
    let cert = issued(&h).await;

    let result = h.engine.revoke_certificate(DOMAIN).await;

    assert!(result.success, "{}", result.message);
    assert!(result.live_config_changed);
    assert!(h.store.get_certificate_by_domain(DOMAIN).await.unwrap().is_none());
    assert!(!h.files().contains("tls-shop.example.com.conf"));
    let revoked = h.acme.revoked.lock().unwrap();
    assert_eq!(revoked.len(), 1);
    assert_eq!(
        revoked[0].display().to_string(),
        cert.certificate_path.unwrap()
    );
}

#[tokio::test]
async fn test_renewal_sweep_threshold() {
    let h = Harness::new();
    let now = Utc::now();
    let rows = [
        ("thirty.example.com", CertificateStatus::Active, 30),
        ("thirtyone.example.com", CertificateStatus::Active, 31),
        ("expired.example.com", CertificateStatus::Active, -1),
        ("failed.example.com", CertificateStatus::Failed, 5),
    ];
    for (domain, status, days) in rows {
        let mut cert = Certificate::pending(domain, EMAIL);
        cert.status = status;
        cert.expires_at = Some(now + Duration::days(days));
        h.store.create_certificate(cert).await.unwrap();
    }

    let report = h.engine.renew_all_at(now).await;

    assert_eq!(report.checked, 2);
    assert_eq!(report.not_due, 2);
    assert_eq!(report.renewed, 0);
    assert!(report.failed.is_empty());
    assert!(!report.live_config_changed);
    assert!(report.to_result().success);
}

#[tokio::test]
async fn test_status_reports() {
    let h = Harness::new();

    let unknown = h.engine.get_certificate_status(DOMAIN).await.unwrap();
    assert_eq!(unknown.status, None);
    assert!(!unknown.valid);
    assert_eq!(unknown.days_left, None);

    let cert = issued(&h).await;
    let known = h.engine.get_certificate_status(DOMAIN).await.unwrap();
    assert_eq!(known.status, Some(CertificateStatus::Active));
    assert!(known.valid);
    assert_eq!(known.expires_at, cert.expires_at);

    let later = cert.expires_at.unwrap() + Duration::hours(1);
    let expired = h.engine.status_at(DOMAIN, later).await.unwrap();
    assert_eq!(expired.status, Some(CertificateStatus::Expired));
    assert!(!expired.valid);
}
