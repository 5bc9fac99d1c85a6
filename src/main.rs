//! proxy-manager
//!
//! # Architecture Overview
//!
//! ```text
//!   admin API ──┐
//!   SIGHUP ─────┤                 ┌──────────────────────────────────────┐
//!   store file ─┼─▶ trigger ─────▶│          ReloadCoordinator           │
//!   certs ──────┘                 │ snapshot → render → sync → test →    │
//!                                 │ reload   (restore on any failure)    │
//!                                 └──────────────┬───────────────────────┘
//!                                                │
//!                                                ▼
//!                                     nginx conf.d fragments
//!                                     nginx -t / nginx -s reload
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use proxy_manager::config::load_config;
use proxy_manager::observability::{logging, metrics};
use proxy_manager::Manager;

#[derive(Parser)]
#[command(name = "proxy-manager", version)]
#[command(about = "Keeps nginx configuration in step with a record store", long_about = None)]
struct Args {
    /// Path to the manager configuration file.
    #[arg(short, long, default_value = "/etc/proxy-manager/manager.toml")]
    config: PathBuf,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logging depends on the config, so load errors go to stderr.
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if args.check {
        println!("{}: configuration ok", args.config.display());
        return ExitCode::SUCCESS;
    }

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        fragment_dir = %config.paths.fragment_dir.display(),
        "proxy-manager starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let manager = match Manager::build(config) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    match manager.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Manager stopped with an error");
            ExitCode::FAILURE
        }
    }
}
