//! Request/response bodies of the HTTP API

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use contracts::Scheme;
use serde::{Deserialize, Serialize};

/// Envelope of every API response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            message: None,
            data: serde_json::to_value(data).ok(),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// `POST /scan`
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub url: String,
    /// Scheme for a URL given without one
    #[serde(default)]
    pub scheme: Option<Scheme>,
}

/// `POST /batch`
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub scheme: Option<Scheme>,
}

/// A batch entry refused before dispatch
#[derive(Debug, Serialize, Deserialize)]
pub struct RejectedUrl {
    pub url: String,
    pub reason: String,
}

/// One stored response body, as listed by `GET /captures`
#[derive(Debug, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub filename: String,
    pub size: u64,
    /// RFC3339
    pub modified: Option<String>,
    pub url: String,
}
