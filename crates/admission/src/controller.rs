//! AdmissionController - bounded concurrency gate with a waiting queue

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::AdmissionConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::AdmissionError;

/// Outcome of one admission attempt
#[derive(Debug)]
pub enum Admission {
    /// Slot granted; released when the permit drops
    Admitted(AdmissionPermit),
    /// Waiting queue was already full
    RejectedFull,
    /// Deadline passed (or cancelled) while waiting
    RejectedTimeout,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }

    /// HTTP status for a rejection (None when admitted)
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Admitted(_) => None,
            Self::RejectedFull => Some(429),
            Self::RejectedTimeout => Some(503),
        }
    }

    /// Metric / log label
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Admitted(_) => "admitted",
            Self::RejectedFull => "rejected_full",
            Self::RejectedTimeout => "rejected_timeout",
        }
    }

    /// Take the permit out of an admitted outcome
    pub fn into_permit(self) -> Option<AdmissionPermit> {
        match self {
            Self::Admitted(permit) => Some(permit),
            _ => None,
        }
    }
}

/// Point-in-time counters, read under the same lock as mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct AdmissionStats {
    pub active: usize,
    pub waiting: usize,
    pub max_concurrent: usize,
    pub max_queue: usize,
}

#[derive(Debug, Default)]
struct Counters {
    active: usize,
    waiting: usize,
}

#[derive(Debug)]
struct Shared {
    config: AdmissionConfig,
    semaphore: Arc<Semaphore>,
    counters: Mutex<Counters>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, counters: &Counters) {
        observability::metrics::record_admission_gauges(counters.active, counters.waiting);
    }
}

/// Request-level concurrency gate
///
/// At most `max_concurrent` permits are held at once and at most
/// `max_queue` callers wait for one. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    shared: Arc<Shared>,
}

impl AdmissionController {
    /// Create a controller
    ///
    /// # Errors
    /// `max_concurrent` or `max_queue` is zero
    pub fn new(config: AdmissionConfig) -> Result<Self, AdmissionError> {
        if config.max_concurrent == 0 {
            return Err(AdmissionError::invalid_config(
                "max_concurrent",
                "must be >= 1",
            ));
        }
        if config.max_queue == 0 {
            return Err(AdmissionError::invalid_config("max_queue", "must be >= 1"));
        }

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
                counters: Mutex::new(Counters::default()),
            }),
        })
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.shared.config
    }

    /// Deadline derived from `acquire_timeout_ms`
    pub fn default_deadline(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.shared.config.acquire_timeout_ms)
    }

    /// Wait for a slot until `deadline`
    pub async fn acquire(&self, deadline: Instant) -> Admission {
        self.acquire_inner(deadline, None).await
    }

    /// Wait for a slot until `deadline` or until `cancel` fires
    pub async fn acquire_with_cancel(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Admission {
        self.acquire_inner(deadline, Some(cancel)).await
    }

    /// Current counters
    pub fn stats(&self) -> AdmissionStats {
        let counters = self.shared.lock();
        AdmissionStats {
            active: counters.active,
            waiting: counters.waiting,
            max_concurrent: self.shared.config.max_concurrent,
            max_queue: self.shared.config.max_queue,
        }
    }

    #[instrument(name = "admission_acquire", skip(self, cancel))]
    async fn acquire_inner(
        &self,
        deadline: Instant,
        cancel: Option<&CancellationToken>,
    ) -> Admission {
        let waiting = {
            let mut counters = self.shared.lock();

            if let Ok(permit) = Arc::clone(&self.shared.semaphore).try_acquire_owned() {
                counters.active += 1;
                self.shared.publish(&counters);
                drop(counters);
                return self.finish(Admission::Admitted(self.permit(permit)));
            }

            if counters.waiting >= self.shared.config.max_queue {
                drop(counters);
                return self.finish(Admission::RejectedFull);
            }

            counters.waiting += 1;
            self.shared.publish(&counters);
            WaitingGuard {
                shared: Arc::clone(&self.shared),
                armed: true,
            }
        };

        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            acquired = Arc::clone(&self.shared.semaphore).acquire_owned() => match acquired {
                Ok(permit) => {
                    waiting.promote();
                    Admission::Admitted(self.permit(permit))
                }
                Err(_) => Admission::RejectedTimeout,
            },
            _ = tokio::time::sleep_until(deadline) => Admission::RejectedTimeout,
            _ = cancelled => Admission::RejectedTimeout,
        };

        self.finish(outcome)
    }

    fn permit(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        AdmissionPermit {
            shared: Arc::clone(&self.shared),
            permit: Some(permit),
        }
    }

    fn finish(&self, outcome: Admission) -> Admission {
        debug!(outcome = outcome.outcome(), "admission decided");
        observability::metrics::record_admission(outcome.outcome());
        outcome
    }
}

/// Holds one waiting-queue slot; gives it back when dropped
///
/// Covers deadline, cancellation and a dropped acquire future alike.
struct WaitingGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl WaitingGuard {
    /// waiting -= 1, active += 1 in one critical section
    fn promote(mut self) {
        let mut counters = self.shared.lock();
        counters.waiting -= 1;
        counters.active += 1;
        self.shared.publish(&counters);
        self.armed = false;
    }
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        if self.armed {
            let mut counters = self.shared.lock();
            counters.waiting -= 1;
            self.shared.publish(&counters);
        }
    }
}

/// RAII admission slot
///
/// Dropping (or `release`) frees the slot exactly once.
#[derive(Debug)]
pub struct AdmissionPermit {
    shared: Arc<Shared>,
    permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionPermit {
    /// Release explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            let mut counters = self.shared.lock();
            counters.active -= 1;
            self.shared.publish(&counters);
            // decrement before the semaphore hands the slot to a waiter
            drop(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn controller(max_concurrent: usize, max_queue: usize) -> AdmissionController {
        AdmissionController::new(AdmissionConfig {
            max_concurrent,
            max_queue,
            acquire_timeout_ms: 5000,
        })
        .unwrap()
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(10)
    }

    async fn wait_for_waiting(ctrl: &AdmissionController, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while ctrl.stats().waiting != n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("waiter never queued");
    }

    #[test]
    fn test_invalid_config() {
        let err = AdmissionController::new(AdmissionConfig {
            max_concurrent: 0,
            max_queue: 1,
            acquire_timeout_ms: 100,
        })
        .unwrap_err();
        assert!(err.to_string().contains("max_concurrent"));

        assert!(AdmissionController::new(AdmissionConfig {
            max_concurrent: 1,
            max_queue: 0,
            acquire_timeout_ms: 100,
        })
        .is_err());
    }

    #[tokio::test]
    async fn test_two_admitted_one_queued_one_rejected() {
        let ctrl = controller(2, 1);

        let first = ctrl.acquire(far()).await.into_permit().unwrap();
        let second = ctrl.acquire(far()).await.into_permit().unwrap();
        assert_eq!(ctrl.stats().active, 2);

        let waiter = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.acquire(far()).await })
        };
        wait_for_waiting(&ctrl, 1).await;

        let fourth = ctrl.acquire(far()).await;
        assert!(matches!(fourth, Admission::RejectedFull));
        assert_eq!(fourth.status_code(), Some(429));
        assert_eq!(ctrl.stats().waiting, 1);

        first.release();
        let third = waiter.await.unwrap();
        assert!(third.is_admitted());

        let stats = ctrl.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.waiting, 0);

        drop(third);
        drop(second);
        let stats = ctrl.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn test_timeout_gives_back_queue_slot() {
        let ctrl = controller(1, 1);
        let _held = ctrl.acquire(far()).await;

        let outcome = ctrl
            .acquire(Instant::now() + Duration::from_millis(50))
            .await;
        assert!(matches!(outcome, Admission::RejectedTimeout));
        assert_eq!(outcome.status_code(), Some(503));

        let stats = ctrl.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let ctrl = controller(1, 4);
        let _held = ctrl.acquire(far()).await;
        let token = CancellationToken::new();

        let waiter = {
            let ctrl = ctrl.clone();
            let token = token.clone();
            tokio::spawn(async move { ctrl.acquire_with_cancel(far(), &token).await })
        };
        wait_for_waiting(&ctrl, 1).await;

        token.cancel();
        let outcome = waiter.await.unwrap();
        assert!(matches!(outcome, Admission::RejectedTimeout));
        assert_eq!(ctrl.stats().waiting, 0);
    }

    #[tokio::test]
    async fn test_dropped_acquire_future_releases_waiting() {
        let ctrl = controller(1, 1);
        let _held = ctrl.acquire(far()).await;

        let waiter = {
            let ctrl = ctrl.clone();
            tokio::spawn(async move { ctrl.acquire(far()).await })
        };
        wait_for_waiting(&ctrl, 1).await;

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(ctrl.stats().waiting, 0);
        assert_eq!(ctrl.stats().active, 1);
    }

    #[tokio::test]
    async fn test_counters_never_exceed_limits() {
        let ctrl = controller(3, 5);
        let mut tasks = Vec::new();

        for _ in 0..20 {
            let ctrl = ctrl.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = ctrl
                    .acquire(Instant::now() + Duration::from_millis(500))
                    .await;
                let stats = ctrl.stats();
                assert!(stats.active <= stats.max_concurrent);
                assert!(stats.waiting <= stats.max_queue);
                if let Admission::Admitted(permit) = outcome {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    permit.release();
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }

        let stats = ctrl.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.waiting, 0);
    }
}
