use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::{ArcSwap, ArcSwapOption};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::observability::metrics;
use crate::proxy::{self, ProxyController, ProxyStatus};
use crate::reload::result::{ApplyError, OperationResult};
use crate::reload::state::{PassState, PassSummary, Trigger};
use crate::render::{self, RenderSettings};
use crate::store::RecordStore;
use crate::sync::{self, FileSnapshot, SyncError, SyncReport};

/// A write or removal of a fragment outside the rendered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentChange {
    Write { name: String, contents: String },
    Remove { name: String },
}

impl FragmentChange {
    pub fn write(name: impl Into<String>, contents: impl Into<String>) -> Self {
        FragmentChange::Write {
            name: name.into(),
            contents: contents.into(),
        }
    }

    pub fn remove(name: impl Into<String>) -> Self {
        FragmentChange::Remove { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            FragmentChange::Write { name, .. } | FragmentChange::Remove { name } => name,
        }
    }
}

/// Serializes every change to the fragment tree and drives it through
/// sync, validation and reload.
pub struct ReloadCoordinator {
    store: Arc<dyn RecordStore>,
    proxy: Arc<dyn ProxyController>,
    settings: RenderSettings,
    fragment_dir: PathBuf,
    main_config: PathBuf,
    /// Whole-tree critical section.
    lock: Mutex<()>,
    state: ArcSwap<PassState>,
    last_pass: ArcSwapOption<PassSummary>,
}

impl ReloadCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        proxy: Arc<dyn ProxyController>,
        settings: RenderSettings,
        fragment_dir: impl Into<PathBuf>,
        main_config: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            proxy,
            settings,
            fragment_dir: fragment_dir.into(),
            main_config: main_config.into(),
            lock: Mutex::new(()),
            state: ArcSwap::from_pointee(PassState::Idle),
            last_pass: ArcSwapOption::empty(),
        }
    }

    pub fn from_config(
        config: &ManagerConfig,
        store: Arc<dyn RecordStore>,
        proxy: Arc<dyn ProxyController>,
    ) -> Self {
        Self::new(
            store,
            proxy,
            RenderSettings::from_config(config),
            config.paths.fragment_dir.clone(),
            config.paths.main_config.clone(),
        )
    }

    pub fn state(&self) -> PassState {
        **self.state.load()
    }

    pub fn last_pass(&self) -> Option<Arc<PassSummary>> {
        self.last_pass.load_full()
    }

    pub fn fragment_dir(&self) -> &Path {
        &self.fragment_dir
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn proxy_status(&self) -> ProxyStatus {
        self.proxy.status().await
    }

    /// Render the current records and apply them, reporting the outcome.
    pub async fn render_and_apply(&self, trigger: Trigger) -> OperationResult {
        match self.apply(&trigger).await {
            Ok(report) => OperationResult::ok(
                format!(
                    "Configuration applied: {} written, {} deleted, {} unchanged",
                    report.written.len(),
                    report.deleted.len(),
                    report.unchanged
                ),
                true,
            ),
            Err(e) => e.into(),
        }
    }

    /// Typed form of [`render_and_apply`](Self::render_and_apply).
    pub async fn apply(&self, trigger: &Trigger) -> Result<SyncReport, ApplyError> {
        let _guard = self.lock.lock().await;
        let pass_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("reload_pass", %pass_id, trigger = %trigger);

        let result = self.run_render_pass().instrument(span).await;
        self.finish(pass_id, trigger, result.as_ref(), started);
        result
    }

    /// Write or remove fragments outside the managed set, with the same
    /// validate, reload and restore discipline as a render pass.
    pub async fn apply_unmanaged(
        &self,
        trigger: &Trigger,
        changes: &[FragmentChange],
    ) -> Result<SyncReport, ApplyError> {
        let _guard = self.lock.lock().await;
        let pass_id = Uuid::new_v4();
        let started = Instant::now();
        let span = info_span!("reload_pass", %pass_id, trigger = %trigger);

        let result = self
            .run_file_pass(&self.fragment_dir, changes)
            .instrument(span)
            .await;
        self.finish(pass_id, trigger, result.as_ref(), started);
        result
    }

    /// Run the config test against the current tree without reloading.
    pub async fn validate_only(&self) -> OperationResult {
        let _guard = self.lock.lock().await;
        self.set_state(PassState::Validating);
        let result = proxy::validate(self.proxy.as_ref(), &self.fragment_dir).await;
        self.set_state(PassState::Idle);
        match result {
            Ok(()) => OperationResult::ok("Configuration test passed", false),
            Err(e) => ApplyError::from(e).into(),
        }
    }

    /// Reload the tree as it is on disk, still gated on a passing test.
    pub async fn reload_only(&self) -> OperationResult {
        match self.reload_current().await {
            Ok(()) => OperationResult::ok("Proxy reloaded", true),
            Err(e) => {
                warn!(error = %e, "Manual reload failed");
                e.into()
            }
        }
    }

    /// Typed form of [`reload_only`](Self::reload_only).
    pub async fn reload_current(&self) -> Result<(), ApplyError> {
        let _guard = self.lock.lock().await;
        self.set_state(PassState::Validating);
        let result = match proxy::validate(self.proxy.as_ref(), &self.fragment_dir).await {
            Ok(()) => {
                self.set_state(PassState::Reloading);
                self.proxy.reload().await.map_err(ApplyError::Reload)
            }
            Err(e) => Err(ApplyError::from(e)),
        };
        self.set_state(PassState::Idle);
        result
    }

    /// Contents of the hand-managed main fragment; empty when absent.
    pub async fn read_main_config(&self) -> Result<String, ApplyError> {
        match tokio::fs::read_to_string(&self.main_config).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(SyncError::io("read", &self.main_config)(e).into()),
        }
    }

    /// Replace the main fragment; the previous bytes come back if the proxy
    /// rejects the new text.
    pub async fn save_main_config(&self, text: &str) -> OperationResult {
        let Some(name) = self
            .main_config
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
        else {
            return OperationResult::failed("main config path does not name a file");
        };
        let dir = self
            .main_config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let _guard = self.lock.lock().await;
        let pass_id = Uuid::new_v4();
        let started = Instant::now();
        let trigger = Trigger::MainConfig;
        let span = info_span!("reload_pass", %pass_id, trigger = %trigger);

        let changes = [FragmentChange::write(name, text)];
        let result = self.run_file_pass(&dir, &changes).instrument(span).await;
        self.finish(pass_id, &trigger, result.as_ref(), started);

        match result {
            Ok(_) => OperationResult::ok("Main configuration saved and reloaded", true),
            Err(e) => e.into(),
        }
    }

    async fn run_render_pass(&self) -> Result<SyncReport, ApplyError> {
        let snapshot = self.store.snapshot().await?;
        let fragments = render::render(&snapshot, &self.settings)?;

        self.set_state(PassState::Syncing);
        let mut names = sync::managed_files(&self.fragment_dir).await?;
        names.extend(fragments.keys().map(|key| key.file_name()));
        let backup = FileSnapshot::capture(&self.fragment_dir, names).await?;

        let report = match sync::sync(&fragments, &self.fragment_dir).await {
            Ok(report) => report,
            Err(e) => {
                self.restore(&backup).await;
                return Err(e.into());
            }
        };

        self.validate_and_reload(&backup).await?;
        Ok(report)
    }

    async fn run_file_pass(
        &self,
        dir: &Path,
        changes: &[FragmentChange],
    ) -> Result<SyncReport, ApplyError> {
        self.set_state(PassState::Syncing);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(SyncError::io("create", dir))?;
        let names: Vec<String> = changes.iter().map(|c| c.name().to_string()).collect();
        let backup = FileSnapshot::capture(dir, names).await?;

        let mut report = SyncReport::default();
        for change in changes {
            let step = match change {
                FragmentChange::Write { name, contents } => {
                    sync::write_if_changed(dir, name, contents.as_bytes())
                        .await
                        .map(|written| {
                            if written {
                                report.written.push(name.clone());
                            } else {
                                report.unchanged += 1;
                            }
                        })
                }
                FragmentChange::Remove { name } => {
                    sync::remove_if_present(dir, name).await.map(|removed| {
                        if removed {
                            report.deleted.push(name.clone());
                        }
                    })
                }
            };
            if let Err(e) = step {
                self.restore(&backup).await;
                return Err(e.into());
            }
        }

        self.validate_and_reload(&backup).await?;
        Ok(report)
    }

    /// Validate then reload; any failure puts `backup` back.
    async fn validate_and_reload(&self, backup: &FileSnapshot) -> Result<(), ApplyError> {
        self.set_state(PassState::Validating);
        if let Err(e) = proxy::validate(self.proxy.as_ref(), &self.fragment_dir).await {
            self.restore(backup).await;
            return Err(e.into());
        }

        self.set_state(PassState::Reloading);
        if let Err(e) = self.proxy.reload().await {
            self.restore(backup).await;
            return Err(ApplyError::Reload(e));
        }
        Ok(())
    }

    async fn restore(&self, backup: &FileSnapshot) {
        match backup.restore().await {
            Ok(()) => info!(files = backup.len(), "Fragments restored to pre-pass state"),
            Err(e) => error!(
                error = %e,
                "Failed to restore fragments, directory may hold unvalidated changes"
            ),
        }
    }

    fn finish(
        &self,
        pass_id: Uuid,
        trigger: &Trigger,
        result: Result<&SyncReport, &ApplyError>,
        started: Instant,
    ) {
        let summary = match result {
            Ok(report) => {
                info!(
                    %pass_id,
                    trigger = %trigger,
                    written = report.written.len(),
                    deleted = report.deleted.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Reload pass applied"
                );
                metrics::record_pass(trigger.kind(), "applied", started);
                PassSummary {
                    pass_id,
                    trigger: trigger.to_string(),
                    success: true,
                    message: "applied".to_string(),
                    files_written: report.written.len(),
                    files_deleted: report.deleted.len(),
                    finished_at: chrono::Utc::now(),
                }
            }
            Err(err) => {
                self.set_state(PassState::Failed);
                warn!(%pass_id, trigger = %trigger, error = %err, "Reload pass failed");
                metrics::record_pass(trigger.kind(), err.outcome_label(), started);
                PassSummary {
                    pass_id,
                    trigger: trigger.to_string(),
                    success: false,
                    message: err.to_string(),
                    files_written: 0,
                    files_deleted: 0,
                    finished_at: chrono::Utc::now(),
                }
            }
        };
        self.last_pass.store(Some(Arc::new(summary)));
        self.set_state(PassState::Idle);
    }

    fn set_state(&self, state: PassState) {
        self.state.store(Arc::new(state));
    }
}
