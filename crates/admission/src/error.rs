//! Admission error types

use thiserror::Error;

/// Admission controller errors
///
/// Rejections are not errors; see `Admission`.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Limits must be >= 1
    #[error("invalid admission config at '{field}': {message}")]
    InvalidConfig { field: String, message: String },
}

impl AdmissionError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}
