//! Command implementations.

mod scan;
mod serve;
mod validate;

pub use scan::run_scan;
pub use serve::run_serve;
pub use validate::run_validate;

use std::path::Path;

use anyhow::{Context, Result};
use contracts::ScanBlueprint;
use tracing::{error, info};

/// Load a config file, or fall back to defaults when none is given
fn load_blueprint(path: Option<&Path>) -> Result<ScanBlueprint> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => Ok(ScanBlueprint::default()),
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
