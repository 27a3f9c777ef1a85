//! `serve` command implementation.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use admission::AdmissionController;
use anyhow::{Context, Result};
use blacklist::Blacklist;
use contracts::{Renderer, ScanBlueprint};
use dispatcher::create_sinks;
use probe::HttpProbeRenderer;
use tracing::{info, warn};

use super::{load_blueprint, shutdown_signal};
use crate::cli::ServeArgs;
use crate::error::CliError;
use crate::server::{router, AppState};

/// Execute the `serve` command
pub async fn run_serve(args: &ServeArgs) -> Result<()> {
    let blueprint = prepare_blueprint(args)?;
    let server = &blueprint.server;

    let blacklist =
        Arc::new(Blacklist::from_config(&blueprint.blacklist).context("Failed to build blacklist")?);
    let renderer = Arc::new(
        HttpProbeRenderer::new(&blueprint.probe).context("Failed to build HTTP probe")?,
    );
    let sinks = Arc::new(create_sinks(&blueprint.sinks).context("Failed to create sinks")?);
    let admission =
        AdmissionController::new(server.admission).context("Invalid admission settings")?;

    if server.api_key.is_none() && !is_loopback(&server.host) {
        warn!(host = %server.host, "API key not set; the API is open to the network");
    }

    let state = AppState {
        blacklist: Arc::clone(&blacklist),
        renderer: Arc::clone(&renderer),
        sinks: Arc::clone(&sinks),
        admission,
        scan: blueprint.scan.clone(),
        api_key: server.api_key.as_deref().map(Arc::from),
        captures: blueprint.probe.body_dir.clone().map(Arc::new),
        started_at: Instant::now(),
    };

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CliError::server(&addr, e.to_string()))?;

    info!(
        addr = %addr,
        blacklist_rules = blacklist.rule_count(),
        max_concurrent = server.admission.max_concurrent,
        max_queue = server.admission.max_queue,
        auth = server.api_key.is_some(),
        "snir API listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            warn!("Received shutdown signal, draining connections...");
        })
        .await
        .map_err(|e| CliError::server(&addr, e.to_string()))?;

    renderer.close().await;
    match Arc::try_unwrap(sinks) {
        Ok(sinks) => sinks.close().await.context("Failed to close sinks")?,
        Err(_) => warn!("Sinks still referenced at shutdown; skipping close"),
    }

    info!("snir API stopped");
    Ok(())
}

/// Load the optional config file and layer the CLI flags on top
fn prepare_blueprint(args: &ServeArgs) -> Result<ScanBlueprint> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;
    let server = &mut blueprint.server;

    if let Some(host) = &args.host {
        server.host = host.clone();
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(api_key) = &args.api_key {
        server.api_key = Some(api_key.clone());
    }
    if let Some(max_concurrent) = args.max_concurrent {
        server.admission.max_concurrent = max_concurrent;
    }
    if let Some(max_queue) = args.queue_size {
        server.admission.max_queue = max_queue;
    }
    if let Some(timeout) = args.acquire_timeout_ms {
        server.admission.acquire_timeout_ms = timeout;
    }
    if let Some(threads) = args.threads {
        blueprint.scan.concurrency = threads;
    }
    if let Some(dir) = &args.body_dir {
        blueprint.probe.body_dir = Some(dir.clone());
    }

    args.blacklist.apply(&mut blueprint.blacklist);

    config_loader::ConfigLoader::validate(&blueprint).context("Invalid server configuration")?;
    Ok(blueprint)
}

fn is_loopback(host: &str) -> bool {
    host == "localhost" || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
