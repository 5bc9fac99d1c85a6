//! Record store file watcher.
//!
//! External edits to the JSON store reload it and trigger a reload pass.
//! The store's own saves show up as events too; `reload_from_disk` reports
//! those as unchanged and they are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::reload::{ReloadCoordinator, Trigger};
use crate::store::MemoryStore;

/// A watcher that monitors the record store file for changes.
pub struct StoreWatcher {
    path: PathBuf,
    change_tx: mpsc::UnboundedSender<()>,
}

impl StoreWatcher {
    /// Create a new StoreWatcher.
    ///
    /// Returns the watcher and a receiver of change notifications.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                change_tx,
            },
            change_rx,
        )
    }

    /// Start watching. The parent directory is watched because saves replace
    /// the file by rename.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.change_tx.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Store watcher started");
        Ok(watcher)
    }
}

/// Apply store file changes until shutdown. Bursts of events collapse into one
/// reload.
pub async fn run_store_reloader(
    mut changes: mpsc::UnboundedReceiver<()>,
    store: Arc<MemoryStore>,
    coordinator: Arc<ReloadCoordinator>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            event = changes.recv() => {
                if event.is_none() {
                    break;
                }
                // Let the writer finish before reading.
                tokio::time::sleep(Duration::from_millis(200)).await;
                while changes.try_recv().is_ok() {}

                match store.reload_from_disk().await {
                    Ok(true) => {
                        tracing::info!("Record store changed on disk, applying");
                        let result = coordinator
                            .render_and_apply(Trigger::External("store_file"))
                            .await;
                        if !result.success {
                            tracing::warn!(message = %result.message, "Store file change not applied");
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!("Failed to reload store: {}. Keeping current records.", e);
                    }
                }
            }
        }
    }
    tracing::debug!("Store reloader stopped");
}
