//! Per-sink and per-pool counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Total successful writes
    write_count: AtomicU64,
    /// Total write failures
    failure_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current queue length
    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Get total write count
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Increment write count
    pub fn inc_write_count(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get failure count
    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Increment failure count
    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            failure_count: self.failure_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub failure_count: u64,
}

/// Worker pool counters
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    received: AtomicU64,
    rendered: AtomicU64,
    blocked: AtomicU64,
    render_failed: AtomicU64,
    skipped: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn inc_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rendered(&self) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_render_failed(&self) {
        self.render_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            render_failed: self.render_failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Outcome totals of a dispatch session
///
/// Once the workers have exited:
/// `received == rendered + blocked + render_failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub received: u64,
    pub rendered: u64,
    pub blocked: u64,
    pub render_failed: u64,
    pub skipped: u64,
}

impl DispatchStats {
    /// Results handed to the fan-out
    pub fn results(&self) -> u64 {
        self.rendered + self.blocked + self.render_failed
    }
}
