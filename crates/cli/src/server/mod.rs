//! HTTP API
//!
//! ```text
//! GET  /         index            (public)
//! GET  /health   liveness         (public)
//! GET  /stats    admission stats  (api key)
//! GET  /captures  stored bodies    (api key)
//! GET  /captures/{filename}        (api key)
//! POST /scan     one URL          (api key + admission)
//! POST /batch    several URLs     (api key + admission)
//! ```

mod handlers;
mod middleware;
mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use admission::AdmissionController;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use blacklist::Blacklist;
use contracts::{DispatcherConfig, Renderer};
use dispatcher::SinkFanout;
use tower_http::trace::TraceLayer;

/// Shared state of every route
pub struct AppState<R> {
    pub blacklist: Arc<Blacklist>,
    pub renderer: Arc<R>,
    pub sinks: Arc<SinkFanout>,
    pub admission: AdmissionController,
    pub scan: DispatcherConfig,
    pub api_key: Option<Arc<str>>,
    /// `probe.body_dir`
    pub captures: Option<Arc<PathBuf>>,
    pub started_at: Instant,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            blacklist: Arc::clone(&self.blacklist),
            renderer: Arc::clone(&self.renderer),
            sinks: Arc::clone(&self.sinks),
            admission: self.admission.clone(),
            scan: self.scan.clone(),
            api_key: self.api_key.clone(),
            captures: self.captures.clone(),
            started_at: self.started_at,
        }
    }
}

/// Build the API router
///
/// Authentication runs before admission, so rejected keys never take a
/// slot.
pub fn router<R>(state: AppState<R>) -> Router
where
    R: Renderer + Sync + 'static,
{
    let admitted = Router::new()
        .route("/scan", post(handlers::scan::<R>))
        .route("/batch", post(handlers::batch::<R>))
        .route_layer(from_fn_with_state(
            state.admission.clone(),
            middleware::admission_middleware,
        ));

    let authenticated = Router::new()
        .route("/stats", get(handlers::stats::<R>))
        .route("/captures", get(handlers::list_captures::<R>))
        .route("/captures/{filename}", get(handlers::get_capture::<R>))
        .merge(admitted)
        .route_layer(from_fn_with_state(
            state.api_key.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::index::<R>))
        .route("/health", get(handlers::health))
        .merge(authenticated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use blacklist::HostResolver;
    use contracts::{AdmissionConfig, BlacklistConfig};
    use dispatcher::MemorySink;
    use probe::MockRenderer;
    use tower::ServiceExt;

    use super::types::ApiResponse;

    struct Harness {
        app: Router,
        renderer: Arc<MockRenderer>,
    }

    fn harness(renderer: MockRenderer, api_key: Option<&str>, admission: AdmissionConfig) -> Harness {
        harness_with_captures(renderer, api_key, admission, None)
    }

    fn harness_with_captures(
        renderer: MockRenderer,
        api_key: Option<&str>,
        admission: AdmissionConfig,
        captures: Option<PathBuf>,
    ) -> Harness {
        let public = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));
        let blacklist = Blacklist::with_resolver(
            &BlacklistConfig::default(),
            HostResolver::fixed([
                ("example.com", vec![public]),
                ("example.org", vec![public]),
                ("broken.example", vec![public]),
            ]),
        )
        .unwrap();

        let renderer = Arc::new(renderer);
        let state = AppState {
            blacklist: Arc::new(blacklist),
            renderer: Arc::clone(&renderer),
            sinks: Arc::new(SinkFanout::new().with_sink(MemorySink::new("audit"), 16)),
            admission: AdmissionController::new(admission).unwrap(),
            scan: DispatcherConfig::default(),
            api_key: api_key.map(Arc::from),
            captures: captures.map(Arc::new),
            started_at: Instant::now(),
        };
        Harness {
            app: router(state),
            renderer,
        }
    }

    fn default_harness() -> Harness {
        harness(MockRenderer::new(), None, AdmissionConfig::default())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_of(response: axum::response::Response) -> ApiResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index_are_public() {
        let h = harness(MockRenderer::new(), Some("secret"), AdmissionConfig::default());

        let response = h.app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = h.app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body.data.unwrap()["auth_required"], true);
    }

    #[tokio::test]
    async fn test_api_key_header_and_query() {
        let h = harness(MockRenderer::new(), Some("secret"), AdmissionConfig::default());

        let response = h.app.clone().oneshot(get("/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/stats")
            .header("X-API-Key", "secret")
            .body(Body::empty())
            .unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = h.app.clone().oneshot(get("/stats?api_key=secret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert_eq!(body.data.unwrap()["admission"]["active"], 0);

        let response = h
            .app
            .oneshot(post_json("/scan", r#"{"url": "example.com"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_scan_single_url() {
        let h = default_harness();
        let response = h
            .app
            .oneshot(post_json("/scan", r#"{"url": "example.com"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_of(response).await;
        assert!(body.success);
        assert_eq!(body.data.unwrap()["url"], "https://example.com");
        assert_eq!(h.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_scan_blacklisted_is_forbidden() {
        let h = default_harness();
        let response = h
            .app
            .oneshot(post_json(
                "/scan",
                r#"{"url": "http://169.254.169.254/latest/meta-data/"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_of(response).await;
        assert!(body.error.unwrap().contains("blacklisted"));
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_scan_bad_requests() {
        let h = default_harness();

        let response = h
            .app
            .clone()
            .oneshot(post_json("/scan", r#"{"url": "   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = h
            .app
            .oneshot(post_json("/scan", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_scan_render_failure_is_bad_gateway() {
        let h = harness(
            MockRenderer::new().fail_host("broken.example"),
            None,
            AdmissionConfig::default(),
        );
        let response = h
            .app
            .oneshot(post_json("/scan", r#"{"url": "https://broken.example/"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_of(response).await;
        assert_eq!(body.data.unwrap()["failed"], true);
    }

    #[tokio::test]
    async fn test_batch_mixed() {
        let h = default_harness();
        let response = h
            .app
            .oneshot(post_json(
                "/batch",
                r#"{"urls": ["example.com", "https://example.org/a", "http://10.0.0.5/"]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let data = body_of(response).await.data.unwrap();
        assert_eq!(data["submitted"], 2);
        assert_eq!(data["results"].as_array().unwrap().len(), 2);
        assert_eq!(data["rejected"][0]["url"], "http://10.0.0.5/");
        assert_eq!(h.renderer.calls(), 2);
    }

    #[tokio::test]
    async fn test_batch_all_blacklisted() {
        let h = default_harness();
        let response = h
            .app
            .oneshot(post_json(
                "/batch",
                r#"{"urls": ["http://127.0.0.1/", "http://192.168.1.1/"]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_empty() {
        let h = default_harness();
        let response = h
            .app
            .oneshot(post_json("/batch", r#"{"urls": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admission_rejects_when_queue_full() {
        let h = harness(
            MockRenderer::new().with_delay(Duration::from_millis(300)),
            None,
            AdmissionConfig {
                max_concurrent: 1,
                max_queue: 1,
                acquire_timeout_ms: 5000,
            },
        );

        let first = tokio::spawn(
            h.app
                .clone()
                .oneshot(post_json("/scan", r#"{"url": "example.com"}"#)),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = tokio::spawn(
            h.app
                .clone()
                .oneshot(post_json("/scan", r#"{"url": "example.org"}"#)),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let third = h
            .app
            .clone()
            .oneshot(post_json("/scan", r#"{"url": "example.com"}"#))
            .await
            .unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);

        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
        assert_eq!(second.await.unwrap().unwrap().status(), StatusCode::OK);
        assert_eq!(h.renderer.calls(), 2);

        let stats = h.app.oneshot(get("/stats")).await.unwrap();
        let data = body_of(stats).await.data.unwrap();
        assert_eq!(data["admission"]["active"], 0);
        assert_eq!(data["admission"]["waiting"], 0);
    }

    #[tokio::test]
    async fn test_admission_timeout_is_503() {
        let h = harness(
            MockRenderer::new().with_delay(Duration::from_millis(400)),
            None,
            AdmissionConfig {
                max_concurrent: 1,
                max_queue: 4,
                acquire_timeout_ms: 50,
            },
        );

        let first = tokio::spawn(
            h.app
                .clone()
                .oneshot(post_json("/scan", r#"{"url": "example.com"}"#)),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = h
            .app
            .clone()
            .oneshot(post_json("/scan", r#"{"url": "example.org"}"#))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_and_fetch_captures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("example.com_b.html"), "<title>B</title>").unwrap();
        std::fs::write(dir.path().join("example.com_a.html"), "<title>A</title>").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let h = harness_with_captures(
            MockRenderer::new(),
            Some("secret"),
            AdmissionConfig::default(),
            Some(dir.path().to_path_buf()),
        );

        let response = h.app.clone().oneshot(get("/captures")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = h
            .app
            .clone()
            .oneshot(get("/captures?api_key=secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = body_of(response).await.data.unwrap();
        let entries = data.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["filename"], "example.com_a.html");
        assert_eq!(entries[0]["url"], "/captures/example.com_a.html");
        assert_eq!(entries[1]["size"], 16);

        let response = h
            .app
            .clone()
            .oneshot(get("/captures/example.com_a.html?api_key=secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<title>A</title>");

        let response = h
            .app
            .oneshot(get("/captures/missing.html?api_key=secret"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_capture_path_traversal_rejected() {
        let root = tempfile::tempdir().unwrap();
        let captures = root.path().join("captures");
        std::fs::create_dir(&captures).unwrap();
        std::fs::write(root.path().join("secret.txt"), "top secret").unwrap();

        let h = harness_with_captures(
            MockRenderer::new(),
            None,
            AdmissionConfig::default(),
            Some(captures),
        );

        for uri in [
            "/captures/..%2Fsecret.txt",
            "/captures/..%5Csecret.txt",
            "/captures/..",
            "/captures/.hidden",
        ] {
            let response = h.app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_captures_without_body_dir() {
        let h = default_harness();

        let response = h.app.clone().oneshot(get("/captures")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data = body_of(response).await.data.unwrap();
        assert!(data.as_array().unwrap().is_empty());

        let response = h.app.oneshot(get("/captures/a.html")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
