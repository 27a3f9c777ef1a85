//! ResultSink trait - fan-out output interface
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, ScanResult};

/// Result output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(ResultSink: Send)]
pub trait LocalResultSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one scan result
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
