//! HttpProbeRenderer - lightweight GET-based renderer
//!
//! Fetches the page once, records status / protocol / size / `<title>`
//! and optionally stores the body. Redirects are reported, not followed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use contracts::{ProbeConfig, RenderError, Renderer, ScanResult, Target};
use reqwest::{header, redirect, Client, Response};
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::ProbeError;

pub struct HttpProbeRenderer {
    client: Client,
    timeout: Duration,
    body_dir: Option<PathBuf>,
    closed: AtomicBool,
}

impl HttpProbeRenderer {
    /// Build the HTTP client
    ///
    /// # Errors
    /// Client construction failure or unwritable `body_dir`
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(config.ignore_cert_errors)
            .build()?;

        if let Some(dir) = &config.body_dir {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self {
            client,
            timeout,
            body_dir: config.body_dir.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn map_error(&self, e: reqwest::Error) -> RenderError {
        if e.is_timeout() {
            RenderError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            RenderError::request(e.to_string())
        }
    }

    async fn build_result(
        &self,
        target: &Target,
        response: Response,
    ) -> Result<ScanResult, RenderError> {
        let mut result = ScanResult::new(target.as_str());
        result.response_code = response.status().as_u16();
        result.protocol = format!("{:?}", response.version());
        result.final_url = redirect_location(&response).unwrap_or_else(|| response.url().to_string());

        let body = response.text().await.map_err(|e| self.map_error(e))?;
        result.content_length = body.len() as u64;
        result.title = extract_title(&body);

        if let Some(dir) = &self.body_dir {
            let path = dir.join(snapshot_name(target.as_str()));
            tokio::fs::write(&path, body.as_bytes())
                .await
                .map_err(|e| RenderError::process(format!("{}: {e}", path.display())))?;
            result.filename = path.to_string_lossy().into_owned();
        }

        Ok(result)
    }
}

impl Renderer for HttpProbeRenderer {
    fn name(&self) -> &str {
        "http_probe"
    }

    #[instrument(name = "http_probe_render", skip(self, target), fields(url = %target))]
    async fn render(&self, target: &Target) -> Result<ScanResult, RenderError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RenderError::Closed);
        }

        let response = self
            .client
            .get(target.as_str())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        debug!(status = %response.status(), "Response received");

        self.build_result(target, response).await
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Absolute `Location` of a 3xx response
fn redirect_location(response: &Response) -> Option<String> {
    if !response.status().is_redirection() {
        return None;
    }
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    response.url().join(location).ok().map(String::from)
}

/// Text of the first `<title>`, whitespace collapsed
pub fn extract_title(body: &str) -> String {
    let Ok(selector) = Selector::parse("title") else {
        return String::new();
    };
    Html::parse_document(body)
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// File name for a body snapshot
fn snapshot_name(url: &str) -> String {
    let stem: String = url
        .split("://")
        .last()
        .unwrap_or(url)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    let stem = stem.trim_matches('_');
    format!("{}.html", if stem.is_empty() { "index" } else { stem })
}
