//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Invalid pool configuration
    #[error("invalid dispatcher config at '{field}': {message}")]
    Config { field: String, message: String },

    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Input queue closed, target not accepted
    #[error("input queue is closed")]
    InputClosed,

    /// Target rejected before enqueue
    #[error("invalid target: {0}")]
    Target(#[source] contracts::ContractError),

    /// Sink write/close error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// Background task died
    #[error("task '{name}' failed: {message}")]
    Task { name: String, message: String },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a config error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a task failure error
    pub fn task(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            name: name.into(),
            message: message.into(),
        }
    }
}
