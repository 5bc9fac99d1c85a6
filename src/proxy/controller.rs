use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ProxyCommandConfig;
use crate::proxy::process::{self, CommandOutput, ProcessError};

/// Whether the proxy process is up, as far as the pid file tells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

/// The proxy process as seen by the manager.
#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Test the full configuration tree. A rejected tree is `Ok` with a
    /// non-zero exit code; only spawn failures and timeouts are errors.
    async fn config_test(&self, fragment_dir: &Path) -> Result<CommandOutput, ProcessError>;

    /// Graceful reload of the running proxy.
    async fn reload(&self) -> Result<(), ProcessError>;

    async fn status(&self) -> ProxyStatus;
}

/// Controller driving an nginx binary through configurable command lines.
#[derive(Debug, Clone)]
pub struct NginxController {
    test_command: Vec<String>,
    reload_command: Vec<String>,
    pid_file: PathBuf,
    test_timeout: Duration,
    reload_timeout: Duration,
}

impl NginxController {
    pub fn new(config: &ProxyCommandConfig) -> Self {
        Self {
            test_command: config.test_command.clone(),
            reload_command: config.reload_command.clone(),
            pid_file: config.pid_file.clone(),
            test_timeout: Duration::from_secs(config.test_timeout_secs),
            reload_timeout: Duration::from_secs(config.reload_timeout_secs),
        }
    }

    fn test_argv(&self, fragment_dir: &Path) -> Vec<String> {
        let dir = fragment_dir.display().to_string();
        self.test_command
            .iter()
            .map(|arg| arg.replace("{fragment_dir}", &dir))
            .collect()
    }
}

#[async_trait]
impl ProxyController for NginxController {
    async fn config_test(&self, fragment_dir: &Path) -> Result<CommandOutput, ProcessError> {
        process::run(&self.test_argv(fragment_dir), self.test_timeout).await
    }

    async fn reload(&self) -> Result<(), ProcessError> {
        process::run_checked(&self.reload_command, self.reload_timeout).await?;
        Ok(())
    }

    async fn status(&self) -> ProxyStatus {
        let pid = tokio::fs::read_to_string(&self.pid_file)
            .await
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok());

        let running = match pid {
            Some(pid) => process_alive(pid).await,
            None => false,
        };
        ProxyStatus { running, pid }
    }
}

#[cfg(target_os = "linux")]
async fn process_alive(pid: u32) -> bool {
    tokio::fs::metadata(format!("/proc/{}", pid)).await.is_ok()
}

/// Without procfs a readable pid file is taken at its word.
#[cfg(not(target_os = "linux"))]
async fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(pid_file: PathBuf) -> NginxController {
        NginxController::new(&ProxyCommandConfig {
            test_command: vec![
                "nginx".into(),
                "-t".into(),
                "-c".into(),
                "{fragment_dir}/../nginx.conf".into(),
            ],
            pid_file,
            ..Default::default()
        })
    }

    #[test]
    fn test_fragment_dir_substituted() {
        let c = controller(PathBuf::from("/run/nginx.pid"));
        assert_eq!(
            c.test_argv(Path::new("/etc/nginx/conf.d")),
            vec!["nginx", "-t", "-c", "/etc/nginx/conf.d/../nginx.conf"]
        );
    }

    #[tokio::test]
    async fn test_status_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let status = controller(dir.path().join("nginx.pid")).status().await;
        assert_eq!(status, ProxyStatus { running: false, pid: None });
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_status_with_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("nginx.pid");
        std::fs::write(&pid_file, format!("{}\n", std::process::id())).unwrap();

        let status = controller(pid_file).status().await;
        assert!(status.running);
        assert_eq!(status.pid, Some(std::process::id()));
    }
}
