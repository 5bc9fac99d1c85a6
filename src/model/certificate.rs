//! Certificate rows tracked by the lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::RecordId;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Lifecycle status. `Expired` is only ever produced by [`Certificate::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Pending,
    Active,
    Expired,
    Failed,
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Active => "active",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub id: RecordId,

    pub domain: String,

    pub email: String,

    pub status: CertificateStatus,

    /// Location of the PEM chain. The file itself belongs to the ACME client.
    #[serde(default)]
    pub certificate_path: Option<String>,

    #[serde(default)]
    pub private_key_path: Option<String>,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Certificate {
    pub fn pending(domain: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: 0,
            domain: domain.into(),
            email: email.into(),
            status: CertificateStatus::Pending,
            certificate_path: None,
            private_key_path: None,
            expires_at: None,
        }
    }

    /// Whole days until expiry, floored. `None` when no expiry is recorded.
    pub fn days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|expires| days_until(expires, now))
    }

    /// A certificate is valid while at least one whole day remains.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.days_left(now).is_some_and(|days| days > 0)
    }

    /// Stored status with `Active` downgraded to `Expired` once the expiry passed.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match (self.status, self.expires_at) {
            (CertificateStatus::Active, Some(expires)) if expires <= now => {
                CertificateStatus::Expired
            }
            (status, _) => status,
        }
    }
}

/// `floor((expires - now) / 1 day)` on millisecond timestamps.
pub fn days_until(expires: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let delta = expires.timestamp_millis() - now.timestamp_millis();
    delta.div_euclid(MILLIS_PER_DAY)
}
