//! Layered error definitions
//!
//! Categorized by source: config / target / render / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Target Errors =====
    /// Target string cannot be turned into a URL
    #[error("invalid target '{target}': {message}")]
    InvalidTarget { target: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink close error
    #[error("sink '{sink_name}' close error: {message}")]
    SinkClose { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid target error
    pub fn invalid_target(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink close error
    pub fn sink_close(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkClose {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

/// Per-target render failure
///
/// Recovered by the dispatcher: the target is recorded as a failed result.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Renderer did not answer within its deadline
    #[error("render timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Network level failure (connect, TLS, reset...)
    #[error("request failed: {message}")]
    Request { message: String },

    /// Page was fetched but could not be turned into a result
    #[error("failed to process page: {message}")]
    Process { message: String },

    /// Renderer has been closed
    #[error("renderer is closed")]
    Closed,
}

impl RenderError {
    /// Create request error
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Create processing error
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }
}
