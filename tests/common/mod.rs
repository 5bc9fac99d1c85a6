//! Shared fakes for integration tests: a scriptable proxy, a file-writing
//! ACME stub and a harness wiring them to a temp directory.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use proxy_manager::certs::{
    AcmeClient, AcmeError, CertificateEngine, CertificateSettings, RenewOutcome,
};
use proxy_manager::proxy::{CommandOutput, ProcessError, ProxyController, ProxyStatus};
use proxy_manager::reload::ReloadCoordinator;
use proxy_manager::render::RenderSettings;
use proxy_manager::store::MemoryStore;

/// Any fragment containing this text fails the config test.
pub const BROKEN_DIRECTIVE: &str = "this_is_not_a_directive";

/// Proxy double: counts calls and fails on demand.
#[derive(Default)]
pub struct FakeProxy {
    pub fail_test: AtomicBool,
    pub fail_reload: AtomicBool,
    pub tests: AtomicUsize,
    pub reloads: AtomicUsize,
    active: AtomicUsize,
    pub max_concurrent: AtomicUsize,
}

impl FakeProxy {
    pub fn tests(&self) -> usize {
        self.tests.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

fn failed(program: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: format!("{}: {}", program, stderr),
    }
}

#[async_trait]
impl ProxyController for FakeProxy {
    async fn config_test(&self, fragment_dir: &Path) -> Result<CommandOutput, ProcessError> {
        self.tests.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_test.load(Ordering::SeqCst) {
            return Ok(failed("nginx", "[emerg] test forced to fail"));
        }
        if let Ok(entries) = std::fs::read_dir(fragment_dir) {
            for entry in entries.flatten() {
                let text = std::fs::read_to_string(entry.path()).unwrap_or_default();
                if text.contains(BROKEN_DIRECTIVE) {
                    return Ok(failed(
                        "nginx",
                        &format!("[emerg] unknown directive in {}", entry.path().display()),
                    ));
                }
            }
        }
        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: "nginx: configuration file test is successful".to_string(),
        })
    }

    async fn reload(&self) -> Result<(), ProcessError> {
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(ProcessError::Failed {
                program: "nginx".to_string(),
                code: Some(1),
                output: failed("nginx", "[error] invalid PID number"),
            });
        }
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> ProxyStatus {
        ProxyStatus {
            running: true,
            pid: Some(4242),
        }
    }
}

/// PEM chain and key for `domain`, valid for `days` from now.
pub fn certificate_pem(domain: &str, days: i64) -> (String, String) {
    let mut params = rcgen::CertificateParams::new(vec![domain.to_string()]).unwrap();
    params.not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// ACME double writing real certificate files under `cert_root/{domain}`.
pub struct StubAcme {
    cert_root: PathBuf,
    fragment_dir: PathBuf,
    pub fail_issue: AtomicBool,
    pub renew_outcome: Mutex<RenewOutcome>,
    /// Whether the challenge fragment existed when issue was called.
    pub saw_challenge: AtomicBool,
    pub issued: Mutex<Vec<String>>,
    pub revoked: Mutex<Vec<PathBuf>>,
}

impl StubAcme {
    pub fn new(cert_root: &Path, fragment_dir: &Path) -> Self {
        Self {
            cert_root: cert_root.to_path_buf(),
            fragment_dir: fragment_dir.to_path_buf(),
            fail_issue: AtomicBool::new(false),
            renew_outcome: Mutex::new(RenewOutcome::NotDue),
            saw_challenge: AtomicBool::new(false),
            issued: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
        }
    }

    pub fn write_files(&self, domain: &str, days: i64) {
        let dir = self.cert_root.join(domain);
        std::fs::create_dir_all(&dir).unwrap();
        let (cert, key) = certificate_pem(domain, days);
        std::fs::write(dir.join("fullchain.pem"), cert).unwrap();
        std::fs::write(dir.join("privkey.pem"), key).unwrap();
    }
}

fn acme_failure(stderr: &str) -> AcmeError {
    AcmeError::Process(ProcessError::Failed {
        program: "certbot".to_string(),
        code: Some(1),
        output: CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.to_string(),
        },
    })
}

#[async_trait]
impl AcmeClient for StubAcme {
    async fn issue(&self, domain: &str, _email: &str, _webroot: &Path) -> Result<(), AcmeError> {
        let challenge = self.fragment_dir.join(format!("acme-{}.conf", domain));
        self.saw_challenge.store(challenge.exists(), Ordering::SeqCst);

        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(acme_failure("Challenge failed for domain"));
        }
        self.write_files(domain, 90);
        self.issued.lock().unwrap().push(domain.to_string());
        Ok(())
    }

    async fn renew(&self, cert_name: &str) -> Result<RenewOutcome, AcmeError> {
        let outcome = *self.renew_outcome.lock().unwrap();
        if outcome == RenewOutcome::Renewed {
            self.write_files(cert_name, 120);
        }
        Ok(outcome)
    }

    async fn revoke(&self, cert_path: &Path) -> Result<(), AcmeError> {
        self.revoked.lock().unwrap().push(cert_path.to_path_buf());
        Ok(())
    }
}

/// Store, fakes, coordinator and engine rooted in one temp directory.
pub struct Harness {
    pub root: TempDir,
    pub store: Arc<MemoryStore>,
    pub proxy: Arc<FakeProxy>,
    pub acme: Arc<StubAcme>,
    pub coordinator: Arc<ReloadCoordinator>,
    pub engine: Arc<CertificateEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let fragment_dir = root.path().join("conf.d");
        let cert_root = root.path().join("live");
        let webroot = root.path().join("webroot");

        let store = Arc::new(MemoryStore::new());
        let proxy = Arc::new(FakeProxy::default());
        let acme = Arc::new(StubAcme::new(&cert_root, &fragment_dir));

        let settings = RenderSettings {
            cert_root: cert_root.clone(),
            webroot: webroot.clone(),
            htpasswd_dir: root.path().join("htpasswd"),
            max_advanced_config_bytes: 64 * 1024,
        };
        let coordinator = Arc::new(ReloadCoordinator::new(
            store.clone(),
            proxy.clone(),
            settings,
            fragment_dir.clone(),
            fragment_dir.join("default.conf"),
        ));
        let engine = Arc::new(CertificateEngine::new(
            store.clone(),
            acme.clone(),
            coordinator.clone(),
            CertificateSettings {
                cert_root,
                webroot,
                renew_threshold_days: 30,
            },
        ));

        Self {
            root,
            store,
            proxy,
            acme,
            coordinator,
            engine,
        }
    }

    pub fn fragment_dir(&self) -> PathBuf {
        self.root.path().join("conf.d")
    }

    /// File names currently in the fragment directory.
    pub fn files(&self) -> BTreeSet<String> {
        match std::fs::read_dir(self.fragment_dir()) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => BTreeSet::new(),
        }
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.fragment_dir().join(name)).unwrap()
    }
}
