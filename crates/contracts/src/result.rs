//! ScanResult - outcome record for one target

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of probing one target, success or failure
///
/// Produced exactly once per target that enters the dispatcher and shared
/// read-only with every sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Target URL as submitted (after scheme normalization)
    pub url: String,

    /// URL after the renderer finished (redirect target when known)
    #[serde(default)]
    pub final_url: String,

    /// Page title
    #[serde(default)]
    pub title: String,

    /// HTTP response code (0 when no response was received)
    #[serde(default)]
    pub response_code: u16,

    /// Protocol reported by the renderer (e.g. "HTTP/1.1")
    #[serde(default)]
    pub protocol: String,

    /// Response body length in bytes
    #[serde(default)]
    pub content_length: u64,

    /// Reference to the stored page capture, empty when nothing was saved
    #[serde(default)]
    pub filename: String,

    /// Set when the result should be considered failed
    #[serde(default)]
    pub failed: bool,

    /// Human readable reason when `failed` is set
    #[serde(default)]
    pub failed_reason: String,

    /// When the target was probed
    pub probed_at: DateTime<Utc>,
}

impl ScanResult {
    /// Empty successful result for `url`, stamped now
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            final_url: url.clone(),
            url,
            title: String::new(),
            response_code: 0,
            protocol: String::new(),
            content_length: 0,
            filename: String::new(),
            failed: false,
            failed_reason: String::new(),
            probed_at: Utc::now(),
        }
    }

    /// Failed result for `url` with `reason`, stamped now
    pub fn failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failed: true,
            failed_reason: reason.into(),
            ..Self::new(url)
        }
    }

    /// Short status used by tabular and console sinks
    pub fn status(&self) -> String {
        if self.failed {
            format!("failed: {}", self.failed_reason)
        } else {
            "ok".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result() {
        let result = ScanResult::failed("http://10.0.0.1", "blacklisted");
        assert!(result.failed);
        assert_eq!(result.failed_reason, "blacklisted");
        assert_eq!(result.url, result.final_url);
        assert_eq!(result.status(), "failed: blacklisted");
    }

    #[test]
    fn test_json_field_names() {
        let mut result = ScanResult::new("https://example.com");
        result.response_code = 200;
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["response_code"], 200);
        assert_eq!(json["failed"], false);
        assert!(json.get("probed_at").is_some());
        assert!(json.get("failed_reason").is_some());
    }
}
