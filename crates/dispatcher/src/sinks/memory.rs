//! MemorySink - collects results in memory

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{ContractError, ResultSink, ScanResult};

type Store = Arc<Mutex<Vec<ScanResult>>>;

fn lock(store: &Store) -> MutexGuard<'_, Vec<ScanResult>> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory collector
pub struct MemorySink {
    name: String,
    store: Store,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::default(),
        }
    }

    /// Handle for reading collected results
    pub fn reader(&self) -> MemorySinkReader {
        MemorySinkReader {
            store: Arc::clone(&self.store),
        }
    }
}

impl ResultSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError> {
        lock(&self.store).push(result.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Read side of a `MemorySink`; stays valid after the sink closes
#[derive(Debug, Clone)]
pub struct MemorySinkReader {
    store: Store,
}

impl MemorySinkReader {
    pub fn len(&self) -> usize {
        lock(&self.store).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.store).is_empty()
    }

    /// Copy of everything collected so far
    pub fn snapshot(&self) -> Vec<ScanResult> {
        lock(&self.store).clone()
    }

    /// Drain collected results
    pub fn take(&self) -> Vec<ScanResult> {
        std::mem::take(&mut *lock(&self.store))
    }
}
