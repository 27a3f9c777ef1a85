//! `scan` command implementation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use blacklist::Blacklist;
use contracts::{
    ContractError, ResultSink, ScanBlueprint, ScanResult, Scheme, SinkConfig, SinkType,
};
use dispatcher::{create_sinks, DispatchStats, DispatcherError, TargetDispatcher, TargetSubmitter};
use observability::ScanMetricsAggregator;
use probe::HttpProbeRenderer;
use tracing::{info, warn};

use super::{load_blueprint, shutdown_signal};
use crate::cli::ScanArgs;
use crate::targets::collect_targets;

/// Execute the `scan` command
pub async fn run_scan(args: &ScanArgs) -> Result<()> {
    let blueprint = prepare_blueprint(args)?;
    let targets = collect_targets(args, blueprint.scan.default_scheme)?;

    info!(
        targets = targets.len(),
        concurrency = blueprint.scan.concurrency,
        blacklist = blueprint.blacklist.enabled,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    let blacklist =
        Arc::new(Blacklist::from_config(&blueprint.blacklist).context("Failed to build blacklist")?);
    let renderer = Arc::new(
        HttpProbeRenderer::new(&blueprint.probe).context("Failed to build HTTP probe")?,
    );

    let aggregator = Arc::new(Mutex::new(ScanMetricsAggregator::new()));
    let mut fanout = create_sinks(&blueprint.sinks).context("Failed to create sinks")?;
    fanout.add(
        SummarySink::new(Arc::clone(&aggregator)),
        blueprint.scan.result_queue_capacity,
    );

    let mut dispatcher = TargetDispatcher::new(blueprint.scan.clone(), blacklist, renderer, fanout)
        .context("Failed to build dispatcher")?;

    let started = Instant::now();
    info!("Starting scan...");

    let interrupted = tokio::select! {
        stats = async {
            dispatcher.start();
            let submitted = feed_targets(&dispatcher.submitter(), &targets).await;
            info!(submitted, "All targets submitted");
            dispatcher.close_input();
            dispatcher.run().await
        } => {
            info!(?stats, "Scan finished");
            false
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping scan...");
            true
        }
    };

    if interrupted {
        dispatcher.cancel();
    }
    let stats = dispatcher
        .close()
        .await
        .context("Failed to close dispatcher")?;

    let summary = aggregator
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .summary();
    print_stats(&stats, started.elapsed().as_secs_f64());
    println!("{summary}");

    info!("snir scan finished");
    Ok(())
}

/// Load the optional config file and layer the CLI flags on top
fn prepare_blueprint(args: &ScanArgs) -> Result<ScanBlueprint> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;

    if let Some(threads) = args.threads {
        blueprint.scan.concurrency = threads;
    }
    if args.http {
        blueprint.scan.default_scheme = Scheme::Http;
    }

    args.blacklist.apply(&mut blueprint.blacklist);

    if let Some(timeout) = args.timeout {
        blueprint.probe.timeout_secs = timeout;
    }
    if let Some(user_agent) = &args.user_agent {
        blueprint.probe.user_agent = user_agent.clone();
    }
    if let Some(dir) = &args.body_dir {
        blueprint.probe.body_dir = Some(dir.clone());
    }
    if args.insecure {
        blueprint.probe.ignore_cert_errors = true;
    }

    if let Some(path) = &args.jsonl {
        push_sink(
            &mut blueprint.sinks,
            SinkConfig::new("jsonl", SinkType::Jsonl)
                .with_param("path", path.to_string_lossy().to_string()),
        );
    }
    if let Some(path) = &args.csv {
        push_sink(
            &mut blueprint.sinks,
            SinkConfig::new("csv", SinkType::Csv)
                .with_param("path", path.to_string_lossy().to_string()),
        );
    }
    if args.stdout || blueprint.sinks.is_empty() {
        push_sink(
            &mut blueprint.sinks,
            SinkConfig::new("stdout", SinkType::Console),
        );
    }

    config_loader::ConfigLoader::validate(&blueprint).context("Invalid scan configuration")?;
    Ok(blueprint)
}

/// Flag-defined sinks replace a config sink of the same name
fn push_sink(sinks: &mut Vec<SinkConfig>, sink: SinkConfig) {
    sinks.retain(|s| s.name != sink.name);
    sinks.push(sink);
}

/// Submit every target; empty entries are logged and skipped
async fn feed_targets(submitter: &TargetSubmitter, targets: &[String]) -> usize {
    let mut submitted = 0;
    for raw in targets {
        match submitter.submit(raw).await {
            Ok(()) => submitted += 1,
            Err(DispatcherError::InputClosed) => {
                warn!("Input closed, remaining targets dropped");
                break;
            }
            Err(e) => warn!(target = %raw, error = %e, "Target skipped"),
        }
    }
    submitted
}

fn print_stats(stats: &DispatchStats, elapsed_secs: f64) {
    println!("\n=== Dispatch ===");
    println!("Received: {}", stats.received);
    println!("Rendered: {}", stats.rendered);
    println!("Blocked: {}", stats.blocked);
    println!("Render failed: {}", stats.render_failed);
    println!("Skipped: {}", stats.skipped);
    println!("Duration: {elapsed_secs:.2}s\n");
}

/// Sink feeding the end-of-run summary
struct SummarySink {
    aggregator: Arc<Mutex<ScanMetricsAggregator>>,
}

impl SummarySink {
    fn new(aggregator: Arc<Mutex<ScanMetricsAggregator>>) -> Self {
        Self { aggregator }
    }
}

impl ResultSink for SummarySink {
    fn name(&self) -> &str {
        "summary"
    }

    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError> {
        self.aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(result);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}
