//! OS signal handling.
//!
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP re-renders every record and applies the result

use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::reload::{ReloadCoordinator, Trigger};

/// Handle signals until shutdown is triggered.
#[cfg(unix)]
pub async fn handle_signals(shutdown: Shutdown, coordinator: Arc<ReloadCoordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut hangup, mut terminate) =
        match (signal(SignalKind::hangup()), signal(SignalKind::terminate())) {
            (Ok(hangup), Ok(terminate)) => (hangup, terminate),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Cannot install signal handlers, only Ctrl+C stops the manager");
                wait_for_ctrl_c().await;
                shutdown.trigger();
                return;
            }
        };
    let mut stopped = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stopped.recv() => break,
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                shutdown.trigger();
                break;
            }
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, re-applying records");
                let result = coordinator.render_and_apply(Trigger::External("sighup")).await;
                if !result.success {
                    tracing::warn!(message = %result.message, "SIGHUP apply failed");
                }
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn handle_signals(shutdown: Shutdown, _coordinator: Arc<ReloadCoordinator>) {
    let mut stopped = shutdown.subscribe();
    tokio::select! {
        _ = stopped.recv() => {}
        _ = wait_for_ctrl_c() => shutdown.trigger(),
    }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
