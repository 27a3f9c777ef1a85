//! SinkFanout - delivers every result to all registered sinks

use std::sync::Arc;

use contracts::{ResultSink, ScanResult, SinkConfig, SinkType};
use tracing::{debug, error, info, instrument};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{ConsoleSink, CsvSink, JsonlSink, MemorySink, MemorySinkReader};

/// Fan-out over independent sink workers
///
/// A failing or slow sink never affects delivery to the others, except
/// that a full queue makes `write` wait (no result is dropped).
#[derive(Default)]
pub struct SinkFanout {
    handles: Vec<SinkHandle>,
    memory_readers: Vec<(String, MemorySinkReader)>,
}

impl SinkFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink; delivery follows registration order
    pub fn add<S: ResultSink + 'static>(&mut self, sink: S, queue_capacity: usize) {
        self.handles.push(SinkHandle::spawn(sink, queue_capacity));
    }

    /// Builder-style `add`
    pub fn with_sink<S: ResultSink + 'static>(mut self, sink: S, queue_capacity: usize) -> Self {
        self.add(sink, queue_capacity);
        self
    }

    /// Register a memory sink and keep its reader
    pub fn add_memory(&mut self, sink: MemorySink, queue_capacity: usize) -> MemorySinkReader {
        let reader = sink.reader();
        self.memory_readers
            .push((sink.name().to_string(), reader.clone()));
        self.add(sink, queue_capacity);
        reader
    }

    /// Reader of a memory sink built by `create_sinks`
    pub fn memory_reader(&self, name: &str) -> Option<MemorySinkReader> {
        self.memory_readers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, reader)| reader.clone())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Sink names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name()).collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Deliver one result to every sink
    pub async fn write(&self, result: Arc<ScanResult>) {
        for handle in &self.handles {
            handle.send(Arc::clone(&result)).await;
        }
    }

    /// Close every sink in order, returning the first error
    #[instrument(name = "sink_fanout_close", skip(self), fields(sinks = self.handles.len()))]
    pub async fn close(self) -> Result<(), DispatcherError> {
        let mut first_error = None;
        for handle in self.handles {
            let name = handle.name().to_string();
            if let Err(e) = handle.shutdown().await {
                error!(sink = %name, error = %e, "Sink close failed");
                first_error.get_or_insert(e);
            }
        }
        debug!("All sinks closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Build a fan-out from sink configs
#[instrument(name = "dispatcher_create_sinks", skip(configs), fields(sink_count = configs.len()))]
pub fn create_sinks(configs: &[SinkConfig]) -> Result<SinkFanout, DispatcherError> {
    let mut fanout = SinkFanout::new();
    for config in configs {
        add_sink(&mut fanout, config)?;
    }
    info!(sinks = ?fanout.names(), "Sinks created");
    Ok(fanout)
}

#[instrument(
    name = "dispatcher_create_sink",
    skip(fanout, config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn add_sink(fanout: &mut SinkFanout, config: &SinkConfig) -> Result<(), DispatcherError> {
    match config.sink_type {
        SinkType::Console => {
            fanout.add(ConsoleSink::new(&config.name), config.queue_capacity);
        }
        SinkType::Memory => {
            fanout.add_memory(MemorySink::new(&config.name), config.queue_capacity);
        }
        SinkType::Jsonl => {
            let sink = JsonlSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            fanout.add(sink, config.queue_capacity);
        }
        SinkType::Csv => {
            let sink = CsvSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            fanout.add(sink, config.queue_capacity);
        }
    }
    Ok(())
}
