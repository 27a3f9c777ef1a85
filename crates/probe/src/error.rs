//! Probe error types

use thiserror::Error;

/// Renderer construction errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Snapshot directory could not be created
    #[error("failed to prepare body directory: {0}")]
    Io(#[from] std::io::Error),
}
