//! Route handlers

use std::io;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use contracts::{DispatcherConfig, RenderError, Renderer, ScanResult, Target};
use dispatcher::{DispatcherError, MemorySink, SinkFanout, TargetDispatcher};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::types::{ApiResponse, BatchRequest, CaptureEntry, RejectedUrl, ScanRequest};
use super::AppState;

/// `GET /`
pub async fn index<R>(State(state): State<AppState<R>>) -> Json<ApiResponse> {
    Json(
        ApiResponse::ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "paths": [
                "GET /health - liveness",
                "GET /stats - admission counters",
                "POST /scan {\"url\": ...} - probe one URL",
                "POST /batch {\"urls\": [...]} - probe several URLs",
                "GET /captures - stored response bodies",
                "GET /captures/{filename} - one stored body",
            ],
            "auth_required": state.api_key.is_some(),
            "auth_method": "X-API-Key header or api_key query parameter",
        }))
        .with_message("snir scan API"),
    )
}

/// `GET /health`
pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({ "status": "ok" })))
}

/// `GET /stats`
pub async fn stats<R>(State(state): State<AppState<R>>) -> Json<ApiResponse> {
    Json(ApiResponse::ok(json!({
        "admission": state.admission.stats(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "sinks": state.sinks.metrics(),
    })))
}

/// `POST /scan`
#[instrument(name = "api_scan", skip_all)]
pub async fn scan<R>(
    State(state): State<AppState<R>>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Response
where
    R: Renderer + Sync + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let scheme = request.scheme.unwrap_or(state.scan.default_scheme);
    let target = match Target::normalize(&request.url, scheme) {
        Ok(target) => target,
        Err(e) => return bad_request(e.to_string()),
    };

    let verdict = state.blacklist.evaluate(target.as_str()).await;
    if let Some(reason) = verdict.reason() {
        warn!(url = %target, reason = %reason, "Blacklisted URL refused");
        return ApiResponse::error(format!("URL is blacklisted: {reason}"))
            .into_response_with(StatusCode::FORBIDDEN);
    }

    let mut results = match dispatch(&state, vec![target]).await {
        Ok(results) => results,
        Err(e) => return internal_error(e),
    };

    match results.pop() {
        Some(result) if result.failed => ApiResponse::error(result.failed_reason.clone())
            .with_data(&result)
            .into_response_with(StatusCode::BAD_GATEWAY),
        Some(result) => ApiResponse::ok(&result).into_response_with(StatusCode::OK),
        None => ApiResponse::error("target was skipped").into_response_with(StatusCode::BAD_REQUEST),
    }
}

/// `POST /batch`
#[instrument(name = "api_batch", skip_all)]
pub async fn batch<R>(
    State(state): State<AppState<R>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Response
where
    R: Renderer + Sync + 'static,
{
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    if request.urls.is_empty() {
        return bad_request("urls must not be empty");
    }

    let scheme = request.scheme.unwrap_or(state.scan.default_scheme);
    let mut allowed = Vec::new();
    let mut rejected = Vec::new();
    for raw in &request.urls {
        let target = match Target::normalize(raw, scheme) {
            Ok(target) => target,
            Err(e) => {
                rejected.push(RejectedUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        match state.blacklist.evaluate(target.as_str()).await.reason() {
            Some(reason) => {
                warn!(url = %target, reason = %reason, "Blacklisted URL skipped in batch");
                rejected.push(RejectedUrl {
                    url: target.into_string(),
                    reason: reason.to_string(),
                });
            }
            None => allowed.push(target),
        }
    }

    if allowed.is_empty() {
        return ApiResponse::error("all requested URLs are blacklisted or invalid")
            .with_data(&rejected)
            .into_response_with(StatusCode::FORBIDDEN);
    }

    let submitted = allowed.len();
    let results = match dispatch(&state, allowed).await {
        Ok(results) => results,
        Err(e) => return internal_error(e),
    };

    ApiResponse::ok(json!({
        "submitted": submitted,
        "results": results,
        "rejected": rejected,
    }))
    .with_message(format!("{submitted} URLs scanned"))
    .into_response_with(StatusCode::OK)
}

/// `GET /captures`
///
/// Files directly under `probe.body_dir`, sorted by name. Empty when no
/// directory is configured or it does not exist yet.
pub async fn list_captures<R>(State(state): State<AppState<R>>) -> Response {
    let Some(dir) = state.captures.as_deref() else {
        return ApiResponse::ok(Vec::<CaptureEntry>::new()).into_response_with(StatusCode::OK);
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return ApiResponse::ok(Vec::<CaptureEntry>::new()).into_response_with(StatusCode::OK);
        }
        Err(e) => return capture_io_error(e),
    };

    let mut captures = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return capture_io_error(e),
        };
        let metadata = match entry.metadata().await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => continue,
            Err(e) => return capture_io_error(e),
        };
        let filename = entry.file_name().to_string_lossy().into_owned();
        captures.push(CaptureEntry {
            url: format!("/captures/{filename}"),
            size: metadata.len(),
            modified: metadata
                .modified()
                .ok()
                .map(|time| DateTime::<Utc>::from(time).to_rfc3339()),
            filename,
        });
    }
    captures.sort_by(|a, b| a.filename.cmp(&b.filename));

    ApiResponse::ok(&captures).into_response_with(StatusCode::OK)
}

/// `GET /captures/{filename}`
///
/// Served as plain text so stored pages never run in the API's origin.
pub async fn get_capture<R>(
    State(state): State<AppState<R>>,
    Path(filename): Path<String>,
) -> Response {
    if !is_plain_filename(&filename) {
        warn!(filename = %filename, "Rejected capture filename");
        return bad_request("invalid filename");
    }
    let Some(dir) = state.captures.as_deref() else {
        return ApiResponse::error("captures are not enabled").into_response_with(StatusCode::NOT_FOUND);
    };

    match tokio::fs::read(dir.join(&filename)).await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{filename}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            ApiResponse::error("file not found").into_response_with(StatusCode::NOT_FOUND)
        }
        Err(e) => capture_io_error(e),
    }
}

/// A single path component: no separators, no `..`, no hidden files
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

fn capture_io_error(e: io::Error) -> Response {
    warn!(error = %e, "Failed to read captures");
    ApiResponse::error(format!("failed to read captures: {e}"))
        .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Run targets through a request-scoped dispatcher and collect the results
///
/// Results are also copied to the server-wide sinks.
async fn dispatch<R>(
    state: &AppState<R>,
    targets: Vec<Target>,
) -> Result<Vec<ScanResult>, DispatcherError>
where
    R: Renderer + Sync + 'static,
{
    let count = targets.len();
    let mut fanout = SinkFanout::new();
    let reader = fanout.add_memory(MemorySink::new("response"), count.max(1));

    let config = DispatcherConfig {
        concurrency: state.scan.concurrency.min(count).max(1),
        ..state.scan.clone()
    };
    let renderer = Arc::new(SharedRenderer(Arc::clone(&state.renderer)));
    let mut dispatcher =
        TargetDispatcher::new(config, Arc::clone(&state.blacklist), renderer, fanout)?;

    dispatcher.start();
    let submitter = dispatcher.submitter();
    for target in targets {
        submitter.submit_target(target).await?;
    }
    dispatcher.close_input();
    dispatcher.run().await;
    let stats = dispatcher.close().await?;
    info!(?stats, "Request dispatched");

    let results = reader.take();
    for result in &results {
        state.sinks.write(Arc::new(result.clone())).await;
    }
    Ok(results)
}

/// Server-owned renderer handed to request-scoped dispatchers
///
/// Closing a request dispatcher must not close the shared renderer.
struct SharedRenderer<R>(Arc<R>);

impl<R: Renderer + Sync> Renderer for SharedRenderer<R> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn render(&self, target: &Target) -> Result<ScanResult, RenderError> {
        self.0.render(target).await
    }

    async fn close(&self) {}
}

fn bad_request(message: impl Into<String>) -> Response {
    ApiResponse::error(message).into_response_with(StatusCode::BAD_REQUEST)
}

fn internal_error(e: DispatcherError) -> Response {
    warn!(error = %e, "Dispatch failed");
    ApiResponse::error(e.to_string()).into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}
