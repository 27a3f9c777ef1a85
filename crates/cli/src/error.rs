//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Nothing to scan
    #[error("No targets given; use --target, --file or --cidr")]
    NoTargets,

    /// Bad `--cidr` value
    #[error("Invalid CIDR '{cidr}': {message}")]
    InvalidCidr { cidr: String, message: String },

    /// Target list could not be read
    #[error("Failed to read target file {}: {source}", path.display())]
    TargetFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Server could not start
    #[error("Failed to start server on {addr}: {message}")]
    Server { addr: String, message: String },
}

impl CliError {
    pub fn invalid_cidr(cidr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            message: message.into(),
        }
    }

    pub fn server(addr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            addr: addr.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
