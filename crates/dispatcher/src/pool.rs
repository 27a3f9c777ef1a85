//! TargetDispatcher - bounded worker pool between targets and sinks
//!
//! ```text
//! submit ─▶ input queue ─▶ N workers ─▶ results queue ─▶ forwarder ─▶ SinkFanout
//!                           │  blacklist
//!                           └▶ Renderer
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_channel::{bounded, Receiver, Sender};
use blacklist::{Blacklist, Verdict};
use contracts::{DispatcherConfig, Renderer, ScanResult, Scheme, Target};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::fanout::SinkFanout;
use crate::metrics::{DispatchCounters, DispatchStats};

/// Cloneable input side of a dispatcher
#[derive(Clone)]
pub struct TargetSubmitter {
    tx: Sender<Target>,
    default_scheme: Scheme,
}

impl TargetSubmitter {
    /// Normalize and enqueue; waits while the input queue is full
    ///
    /// # Errors
    /// - `Target` for empty input
    /// - `InputClosed` after `close_input` / `close`
    pub async fn submit(&self, raw: &str) -> Result<(), DispatcherError> {
        let target = Target::normalize(raw, self.default_scheme).map_err(DispatcherError::Target)?;
        self.submit_target(target).await
    }

    /// Enqueue an already normalized target
    pub async fn submit_target(&self, target: Target) -> Result<(), DispatcherError> {
        self.tx
            .send(target)
            .await
            .map_err(|_| DispatcherError::InputClosed)
    }

    /// Targets waiting in the input queue
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

struct WorkerContext<R> {
    input: Receiver<Target>,
    results: mpsc::Sender<Arc<ScanResult>>,
    blacklist: Arc<Blacklist>,
    renderer: Arc<R>,
    cancel: CancellationToken,
    counters: Arc<DispatchCounters>,
}

impl<R> Clone for WorkerContext<R> {
    fn clone(&self) -> Self {
        Self {
            input: self.input.clone(),
            results: self.results.clone(),
            blacklist: Arc::clone(&self.blacklist),
            renderer: Arc::clone(&self.renderer),
            cancel: self.cancel.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Worker pool for one scan session
///
/// Must be created inside a Tokio runtime (the forwarder task starts
/// immediately). Workers start on `start` / `run`.
pub struct TargetDispatcher<R> {
    config: DispatcherConfig,
    input_tx: Sender<Target>,
    renderer: Arc<R>,
    context: Option<WorkerContext<R>>,
    workers: Vec<JoinHandle<()>>,
    forwarder: Option<JoinHandle<Result<(), DispatcherError>>>,
    cancel: CancellationToken,
    counters: Arc<DispatchCounters>,
}

impl<R> TargetDispatcher<R>
where
    R: Renderer + Sync + 'static,
{
    /// Build the queues and start the forwarder
    ///
    /// # Errors
    /// `Config` when `concurrency` or a queue capacity is zero
    #[instrument(
        name = "target_dispatcher_new",
        skip_all,
        fields(concurrency = config.concurrency, sinks = fanout.len())
    )]
    pub fn new(
        config: DispatcherConfig,
        blacklist: Arc<Blacklist>,
        renderer: Arc<R>,
        fanout: SinkFanout,
    ) -> Result<Self, DispatcherError> {
        validate(&config)?;

        let (input_tx, input_rx) = bounded(config.input_queue_capacity);
        let (results_tx, results_rx) = mpsc::channel(config.result_queue_capacity);
        let cancel = CancellationToken::new();
        let counters = Arc::new(DispatchCounters::default());

        let forwarder = tokio::spawn(forward_results(results_rx, fanout));

        let context = WorkerContext {
            input: input_rx,
            results: results_tx,
            blacklist,
            renderer: Arc::clone(&renderer),
            cancel: cancel.clone(),
            counters: Arc::clone(&counters),
        };

        Ok(Self {
            config,
            input_tx,
            renderer,
            context: Some(context),
            workers: Vec::new(),
            forwarder: Some(forwarder),
            cancel,
            counters,
        })
    }

    /// Input handle
    pub fn submitter(&self) -> TargetSubmitter {
        TargetSubmitter {
            tx: self.input_tx.clone(),
            default_scheme: self.config.default_scheme,
        }
    }

    /// Normalize and enqueue one target
    pub async fn submit(&self, raw: &str) -> Result<(), DispatcherError> {
        self.submitter().submit(raw).await
    }

    /// Close the input queue; workers drain what is left and exit
    pub fn close_input(&self) {
        if self.input_tx.close() {
            debug!("Input queue closed");
        }
    }

    /// Shared cancellation signal
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop workers from taking new targets
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Counters so far
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Spawn the workers (once)
    pub fn start(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };

        info!(workers = self.config.concurrency, "Starting dispatcher workers");
        self.workers = (0..self.config.concurrency)
            .map(|id| tokio::spawn(worker_loop(id, context.clone())))
            .collect();
        // `context` drops here: only workers hold the results sender now
    }

    /// Start (if needed) and wait until every worker has exited
    ///
    /// Returns once the input is closed and drained, or cancellation fires.
    #[instrument(name = "target_dispatcher_run", skip(self))]
    pub async fn run(&mut self) -> DispatchStats {
        self.start();
        self.join_workers().await;
        let stats = self.stats();
        info!(?stats, "Dispatcher workers finished");
        stats
    }

    /// Full teardown
    ///
    /// Cancels, closes the input, waits for the workers, then lets the
    /// forwarder drain the results queue and close every sink.
    #[instrument(name = "target_dispatcher_close", skip(self))]
    pub async fn close(mut self) -> Result<DispatchStats, DispatcherError> {
        self.cancel.cancel();
        self.close_input();

        let abandoned = self.input_tx.len();
        if abandoned > 0 {
            warn!(abandoned, "Targets left in input queue at close");
        }

        self.join_workers().await;
        // Never started: drop the unused results sender
        self.context.take();

        let forwarded = match self.forwarder.take() {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(DispatcherError::task("result_forwarder", e.to_string())),
            },
            None => Ok(()),
        };

        self.renderer.close().await;

        let stats = self.stats();
        info!(?stats, "Dispatcher closed");
        forwarded.map(|()| stats)
    }

    async fn join_workers(&mut self) {
        for (id, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.await {
                error!(worker = id, error = ?e, "Worker task panicked");
            }
        }
    }
}

fn validate(config: &DispatcherConfig) -> Result<(), DispatcherError> {
    if config.concurrency == 0 {
        return Err(DispatcherError::config("concurrency", "must be >= 1"));
    }
    if config.input_queue_capacity == 0 {
        return Err(DispatcherError::config("input_queue_capacity", "must be >= 1"));
    }
    if config.result_queue_capacity == 0 {
        return Err(DispatcherError::config("result_queue_capacity", "must be >= 1"));
    }
    Ok(())
}

#[instrument(name = "dispatcher_worker", skip_all, fields(worker = id))]
async fn worker_loop<R>(id: usize, ctx: WorkerContext<R>)
where
    R: Renderer + Sync,
{
    debug!("Worker started");

    loop {
        let target = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = ctx.input.recv() => match next {
                Ok(target) => target,
                Err(_) => break,
            },
        };

        ctx.counters.inc_received();
        let Some(result) = process_target(&ctx, target).await else {
            continue;
        };

        if ctx.results.send(Arc::new(result)).await.is_err() {
            error!("Results queue closed, stopping worker");
            break;
        }
    }

    debug!("Worker stopped");
}

/// Blacklist, then render; None when the target is skipped
async fn process_target<R>(ctx: &WorkerContext<R>, target: Target) -> Option<ScanResult>
where
    R: Renderer + Sync,
{
    if let Verdict::Blocked(reason) = ctx.blacklist.evaluate(target.as_str()).await {
        ctx.counters.inc_blocked();
        observability::metrics::record_target("blocked");
        info!(url = %target, reason = %reason, "Target blacklisted");
        return Some(ScanResult::failed(
            target.as_str(),
            format!("blacklisted: {reason}"),
        ));
    }

    if let Err(e) = url::Url::parse(target.as_str()) {
        ctx.counters.inc_skipped();
        observability::metrics::record_target("skipped");
        error!(url = %target, error = %e, "Malformed target URL, skipping");
        return None;
    }

    let started = Instant::now();
    let rendered = ctx.renderer.render(&target).await;
    observability::metrics::record_render_duration_ms(started.elapsed().as_secs_f64() * 1000.0);

    match rendered {
        Ok(result) => {
            ctx.counters.inc_rendered();
            observability::metrics::record_target("rendered");
            Some(result)
        }
        Err(e) => {
            ctx.counters.inc_render_failed();
            observability::metrics::record_target("render_failed");
            warn!(url = %target, error = %e, renderer = ctx.renderer.name(), "Render failed");
            Some(ScanResult::failed(target.as_str(), e.to_string()))
        }
    }
}

/// Moves results from the queue to the fan-out, then closes the sinks
#[instrument(name = "result_forwarder", skip_all)]
async fn forward_results(
    mut rx: mpsc::Receiver<Arc<ScanResult>>,
    fanout: SinkFanout,
) -> Result<(), DispatcherError> {
    let mut forwarded: u64 = 0;
    while let Some(result) = rx.recv().await {
        fanout.write(result).await;
        forwarded += 1;
        if forwarded.is_multiple_of(100) {
            debug!(results = forwarded, "Forwarder progress");
        }
    }
    info!(results = forwarded, "Results queue closed, closing sinks");
    fanout.close().await
}
