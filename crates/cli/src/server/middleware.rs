//! API key check and admission gate

use std::sync::Arc;

use admission::{Admission, AdmissionController};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::types::ApiResponse;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_PARAM: &str = "api_key";

/// Reject requests without the configured key (header or query)
pub async fn auth_middleware(
    State(api_key): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(&request, API_KEY_PARAM));

    if !provided.is_some_and(|key| key_matches(&key, &expected)) {
        warn!(path = %request.uri().path(), "Rejected request with invalid API key");
        return ApiResponse::error("invalid API key").into_response_with(StatusCode::UNAUTHORIZED);
    }

    next.run(request).await
}

/// Hold an admission permit for the whole request
///
/// `RejectedFull` answers 429 at once; `RejectedTimeout` answers 503
/// after `acquire_timeout_ms`.
pub async fn admission_middleware(
    State(controller): State<AdmissionController>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    match controller.acquire(controller.default_deadline()).await {
        Admission::Admitted(permit) => {
            debug!(path = %path, "Request admitted");
            let response = next.run(request).await;
            permit.release();
            response
        }
        rejected => {
            let status = rejected
                .status_code()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
            let message = match rejected {
                Admission::RejectedFull => "server busy: request queue full, retry later",
                _ => "server busy: timed out waiting for a slot, retry later",
            };
            warn!(path = %path, status = status.as_u16(), "Request rejected by admission control");
            ApiResponse::error(message).into_response_with(status)
        }
    }
}

/// Constant-time comparison of the key bytes
fn key_matches(provided: &str, expected: &str) -> bool {
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

fn query_param(request: &Request, name: &str) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
