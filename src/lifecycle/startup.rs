//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the record store, proxy controller, coordinator and certificate engine
//! - Run the startup pass so the fragment tree matches the store
//! - Start background tasks (renewal sweep, store watcher, signals)
//! - Bind the admin listener last
//!
//! # Design Decisions
//! - Fail fast: a store that cannot be read or a listener that cannot bind is fatal
//! - A failed startup pass is logged, not fatal; the proxy keeps its last good tree

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;

use crate::admin::{setup_admin_router, AdminState};
use crate::certs::{CertbotClient, CertificateEngine, CertificateSettings};
use crate::config::watcher::{run_store_reloader, StoreWatcher};
use crate::config::ManagerConfig;
use crate::lifecycle::{signals, Shutdown};
use crate::proxy::NginxController;
use crate::reload::{ReloadCoordinator, Trigger};
use crate::store::{MemoryStore, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot open record store: {0}")]
    Store(#[from] StoreError),

    #[error("cannot watch record store: {0}")]
    Watcher(#[from] notify::Error),

    #[error("invalid admin bind address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("cannot bind admin listener on {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("admin listener failed: {0}")]
    Serve(#[source] io::Error),
}

/// The assembled manager, ready to run.
pub struct Manager {
    config: ManagerConfig,
    store: Arc<dyn RecordStore>,
    /// Set when the store is backed by a file that should be watched.
    file_store: Option<Arc<MemoryStore>>,
    coordinator: Arc<ReloadCoordinator>,
    certificates: Arc<CertificateEngine>,
    shutdown: Shutdown,
}

impl Manager {
    pub fn build(config: ManagerConfig) -> Result<Self, StartupError> {
        let (store, file_store) = match &config.paths.store_path {
            Some(path) => {
                let store = Arc::new(MemoryStore::load_from_file(path)?);
                let shared: Arc<dyn RecordStore> = store.clone();
                (shared, Some(store))
            }
            None => {
                tracing::warn!("No store_path configured, records will not survive a restart");
                let shared: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
                (shared, None)
            }
        };

        let proxy = Arc::new(NginxController::new(&config.proxy));
        let coordinator = Arc::new(ReloadCoordinator::from_config(
            &config,
            store.clone(),
            proxy,
        ));
        let acme = Arc::new(CertbotClient::new(&config.acme, &config.paths));
        let certificates = Arc::new(CertificateEngine::new(
            store.clone(),
            acme,
            coordinator.clone(),
            CertificateSettings::from_config(&config),
        ));

        Ok(Self {
            config,
            store,
            file_store,
            coordinator,
            certificates,
            shutdown: Shutdown::new(),
        })
    }

    pub fn coordinator(&self) -> &Arc<ReloadCoordinator> {
        &self.coordinator
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run until SIGTERM/SIGINT or [`Shutdown::trigger`].
    pub async fn run(self) -> Result<(), StartupError> {
        let startup = self
            .coordinator
            .render_and_apply(Trigger::External("startup"))
            .await;
        if startup.success {
            tracing::info!(message = %startup.message, "Startup pass applied");
        } else {
            tracing::error!(message = %startup.message, "Startup pass failed, proxy keeps its current configuration");
        }

        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(signals::handle_signals(
            self.shutdown.clone(),
            self.coordinator.clone(),
        )));

        let interval = self.config.acme.renew_interval_secs;
        if interval > 0 {
            tasks.push(tokio::spawn(run_renewal_sweep(
                self.certificates.clone(),
                Duration::from_secs(interval),
                self.shutdown.subscribe(),
            )));
        } else {
            tracing::info!("Automatic renewal disabled");
        }

        // Dropping the watcher stops it, so it lives until run returns.
        let _watcher = match &self.file_store {
            Some(store) => {
                let path = store
                    .persistence_path()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default();
                let (watcher, changes) = StoreWatcher::new(&path);
                let handle = watcher.run()?;
                tasks.push(tokio::spawn(run_store_reloader(
                    changes,
                    store.clone(),
                    self.coordinator.clone(),
                    self.shutdown.subscribe(),
                )));
                Some(handle)
            }
            None => None,
        };

        let served = if self.config.admin.enabled {
            self.serve_admin().await
        } else {
            self.shutdown.wait().await;
            Ok(())
        };

        self.shutdown.trigger();
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("Shutdown complete");
        served
    }

    async fn serve_admin(&self) -> Result<(), StartupError> {
        let admin = &self.config.admin;
        let address: SocketAddr =
            admin
                .bind_address
                .parse()
                .map_err(|e: std::net::AddrParseError| StartupError::Address {
                    address: admin.bind_address.clone(),
                    reason: e.to_string(),
                })?;

        let state = AdminState {
            store: self.store.clone(),
            coordinator: self.coordinator.clone(),
            certificates: self.certificates.clone(),
            api_key: Arc::from(admin.api_key.as_str()),
            default_body_size: Arc::from(self.config.render.default_client_max_body_size.as_str()),
        };
        let app = setup_admin_router(state).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        tracing::info!(address = %address, "Admin API listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.wait())
            .await
            .map_err(StartupError::Serve)?;

        tracing::info!("Admin API stopped");
        Ok(())
    }
}

/// Renew due certificates every `every` until shutdown. The first sweep runs
/// immediately.
pub async fn run_renewal_sweep(
    certificates: Arc<CertificateEngine>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let report = certificates.renew_all_certificates().await;
                if !report.failed.is_empty() {
                    tracing::warn!(failed = ?report.failed, "Some renewals failed");
                }
            }
        }
    }
    tracing::debug!("Renewal sweep stopped");
}
