//! Blacklist error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a `Blacklist`
///
/// All of them are fatal at construction time; evaluation never fails.
#[derive(Debug, Error)]
pub enum BlacklistError {
    /// Wildcard pattern did not compile into a regex
    #[error("invalid blacklist pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Rule file could not be read
    #[error("failed to read blacklist file '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BlacklistError {
    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}
