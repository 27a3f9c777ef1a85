//! MockRenderer - scripted renderer for tests and dry runs

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use contracts::{RenderError, Renderer, ScanResult, Target};

/// Renderer that never touches the network
///
/// Every target answers `200` with a fixed title, unless its host is in
/// the failure set. Counts calls and peak concurrency.
#[derive(Debug, Default)]
pub struct MockRenderer {
    delay: Duration,
    failing_hosts: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
    rendered: Mutex<Vec<String>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `render`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every target whose host equals `host`
    pub fn fail_host(mut self, host: impl Into<String>) -> Self {
        self.failing_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Total `render` calls
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `render` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// URLs passed to `render`, in call order
    pub fn rendered_urls(&self) -> Vec<String> {
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn should_fail(&self, target: &Target) -> bool {
        url::Url::parse(target.as_str())
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| self.failing_hosts.contains(&host))
    }
}

impl Renderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn render(&self, target: &Target) -> Result<ScanResult, RenderError> {
        if self.is_closed() {
            return Err(RenderError::Closed);
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.rendered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail(target) {
            return Err(RenderError::request("mock connection refused"));
        }

        let mut result = ScanResult::new(target.as_str());
        result.response_code = 200;
        result.protocol = "HTTP/1.1".to_string();
        result.title = "Mock page".to_string();
        Ok(result)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
