//! Reading expiry and checking key material from the files on disk.
//!
//! The expiry always comes from the certificate file, never from ACME client
//! output.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use x509_parser::parse_x509_certificate;

#[derive(Debug, Error)]
pub enum CertFileError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: malformed PEM: {source}", .path.display())]
    Pem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: no certificate found", .path.display())]
    NoCertificate { path: PathBuf },

    #[error("{}: no private key found", .path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("{}: invalid X.509 certificate: {reason}", .path.display())]
    X509 { path: PathBuf, reason: String },
}

/// `notAfter` of the first (leaf) certificate in a PEM chain.
pub fn parse_expiry(path: &Path, pem: &[u8]) -> Result<DateTime<Utc>, CertFileError> {
    let leaf = rustls_pemfile::certs(&mut &pem[..])
        .next()
        .ok_or_else(|| CertFileError::NoCertificate {
            path: path.to_path_buf(),
        })?
        .map_err(|source| CertFileError::Pem {
            path: path.to_path_buf(),
            source,
        })?;

    let (_, cert) = parse_x509_certificate(leaf.as_ref()).map_err(|e| CertFileError::X509 {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| CertFileError::X509 {
        path: path.to_path_buf(),
        reason: format!("notAfter {} out of range", timestamp),
    })
}

pub async fn read_expiry(path: &Path) -> Result<DateTime<Utc>, CertFileError> {
    let pem = read(path).await?;
    parse_expiry(path, &pem)
}

/// Fails unless `path` holds a PEM private key.
pub async fn verify_private_key(path: &Path) -> Result<(), CertFileError> {
    let pem = read(path).await?;
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|source| CertFileError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CertFileError::NoPrivateKey {
            path: path.to_path_buf(),
        })?;
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>, CertFileError> {
    tokio::fs::read(path).await.map_err(|source| CertFileError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(days: i64) -> (String, String) {
        let mut params = rcgen::CertificateParams::new(vec!["a.example.com".to_string()]).unwrap();
        params.not_after = time::OffsetDateTime::from_unix_timestamp(1_900_000_000)
            .unwrap()
            .checked_add(time::Duration::days(days))
            .unwrap();
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    #[test]
    fn test_expiry_from_leaf() {
        let (cert, _) = fixture(0);
        let expires = parse_expiry(Path::new("fullchain.pem"), cert.as_bytes()).unwrap();
        assert_eq!(expires.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_no_certificate_in_file() {
        let (_, key) = fixture(0);
        assert!(matches!(
            parse_expiry(Path::new("fullchain.pem"), key.as_bytes()),
            Err(CertFileError::NoCertificate { .. })
        ));
    }

    #[tokio::test]
    async fn test_private_key_checks() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = fixture(0);
        let key_path = dir.path().join("privkey.pem");
        let cert_path = dir.path().join("fullchain.pem");
        std::fs::write(&key_path, key).unwrap();
        std::fs::write(&cert_path, cert).unwrap();

        assert!(verify_private_key(&key_path).await.is_ok());
        assert!(matches!(
            verify_private_key(&cert_path).await,
            Err(CertFileError::NoPrivateKey { .. })
        ));
        assert!(matches!(
            verify_private_key(&dir.path().join("missing.pem")).await,
            Err(CertFileError::Read { .. })
        ));
    }
}
