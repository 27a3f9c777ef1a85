//! ConsoleSink - logs result summary via tracing

use contracts::{ContractError, ResultSink, ScanResult};
use tracing::{info, instrument, warn};

/// Sink that reports each result as a structured log event
pub struct ConsoleSink {
    name: String,
}

impl ConsoleSink {
    /// Create a new ConsoleSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_result(&self, result: &ScanResult) {
        if result.failed {
            warn!(
                sink = %self.name,
                url = %result.url,
                reason = %result.failed_reason,
                "Target failed"
            );
        } else {
            info!(
                sink = %self.name,
                url = %result.url,
                final_url = %result.final_url,
                code = result.response_code,
                title = %result.title,
                "Target probed"
            );
        }
    }
}

impl ResultSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "console_sink_write",
        skip(self, result),
        fields(sink = %self.name, url = %result.url)
    )]
    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError> {
        self.log_result(result);
        Ok(())
    }

    #[instrument(name = "console_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "console_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "ConsoleSink closed");
        Ok(())
    }
}
