//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{ContractError, ResultSink, ScanResult};

use crate::error::DispatcherError;
use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send results to worker
    tx: mpsc::Sender<Arc<ScanResult>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle, yields the close outcome
    worker_handle: JoinHandle<Result<(), ContractError>>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<S: ResultSink + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle =
            tokio::spawn(async move { sink_worker(sink, rx, worker_metrics, worker_name).await });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a result, waiting for space when the queue is full
    ///
    /// Returns false only if the worker is gone.
    pub async fn send(&self, result: Arc<ScanResult>) -> bool {
        match self.tx.send(result).await {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::SendError(r)) => {
                self.metrics.inc_failure_count();
                error!(sink = %self.name, url = %r.url, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker: drain, flush, close
    ///
    /// Returns the sink's flush/close error, if any.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> Result<(), DispatcherError> {
        // Drop sender to signal worker to stop
        drop(self.tx);
        let outcome = match self.worker_handle.await {
            Ok(result) => result.map_err(DispatcherError::from),
            Err(e) => {
                error!(sink = %self.name, error = ?e, "Worker task panicked");
                Err(DispatcherError::task(&self.name, e.to_string()))
            }
        };
        debug!(sink = %self.name, "SinkHandle shutdown complete");
        outcome
    }
}

/// Worker task that consumes results and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: ResultSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Arc<ScanResult>>,
    metrics: Arc<SinkMetrics>,
    name: String,
) -> Result<(), ContractError> {
    debug!(sink = %name, "Sink worker started");

    while let Some(result) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&result).await {
            Ok(()) => {
                metrics.inc_write_count();
                observability::metrics::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::metrics::record_sink_write(&name, false);
                error!(
                    sink = %name,
                    url = %result.url,
                    error = %e,
                    "Write failed"
                );
            }
        }
    }

    // Close is attempted even when flush fails
    let flushed = sink.flush().await;
    if let Err(e) = &flushed {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    let closed = sink.close().await;
    if let Err(e) = &closed {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
    flushed.and(closed)
}
