//! Mock yield source for testing without network calls.

use super::{DataSourceError, YieldPool, YieldSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock source that returns predefined pools and can be switched into a
/// failing state.
#[derive(Debug, Default)]
pub struct MockYieldSource {
    pools: Mutex<Vec<YieldPool>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl MockYieldSource {
    /// Create a new mock source with no pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pool to the mock source.
    pub fn with_pool(self, pool: YieldPool) -> Self {
        if let Ok(mut pools) = self.pools.lock() {
            pools.push(pool);
        }
        self
    }

    /// Replace the pools returned by subsequent fetches.
    pub fn set_pools(&self, new_pools: Vec<YieldPool>) {
        if let Ok(mut pools) = self.pools.lock() {
            *pools = new_pools;
        }
    }

    /// Make subsequent fetches fail with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetch attempts so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl YieldSource for MockYieldSource {
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, DataSourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DataSourceError::NetworkError("mock failure".to_string()));
        }
        self.pools
            .lock()
            .map(|pools| pools.clone())
            .map_err(|e| DataSourceError::Other(e.to_string()))
    }
}
