//! Time-bounded cache over a [`YieldSource`].
//!
//! The aggregator returns every pool it tracks in one response, so the whole
//! list is cached and individual lookups are served from it. When a refresh
//! fails the previous list is served even if it has expired.

use super::{
    find_pool, to_apr_data, DataSourceError, PoolAprData, PoolQuery, YieldPool, YieldSource,
};
use crate::domain::TimeMs;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct CacheEntry {
    pools: Arc<Vec<YieldPool>>,
    fetched_at: Instant,
}

#[derive(Debug)]
pub struct PoolAprCache {
    source: Arc<dyn YieldSource>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl PoolAprCache {
    pub fn new(source: Arc<dyn YieldSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Current pool list, refreshed when older than the TTL.
    ///
    /// # Errors
    /// Returns the fetch error only when no list has ever been cached.
    pub async fn pools(&self) -> Result<Arc<Vec<YieldPool>>, DataSourceError> {
        {
            let guard = self.entry.read().await;
            if let Some(entry) = guard.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    debug!("Serving {} pools from cache", entry.pools.len());
                    return Ok(entry.pools.clone());
                }
            }
        }

        let mut guard = self.entry.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(entry) = guard.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.pools.clone());
            }
        }

        match self.source.fetch_pools().await {
            Ok(pools) => {
                let pools = Arc::new(pools);
                info!("Refreshed pool cache with {} pools", pools.len());
                *guard = Some(CacheEntry {
                    pools: pools.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(pools)
            }
            Err(e) => match guard.as_ref() {
                Some(stale) => {
                    warn!("Pool refresh failed, serving stale cache: {}", e);
                    Ok(stale.pools.clone())
                }
                None => Err(e),
            },
        }
    }

    /// APR metrics for the pool identified by `query`, `None` when the
    /// aggregator does not list it.
    pub async fn pool_apr(
        &self,
        query: &PoolQuery,
    ) -> Result<Option<PoolAprData>, DataSourceError> {
        let pools = self.pools().await?;
        let found = find_pool(&pools, query).map(|p| to_apr_data(p, TimeMs::now()));
        if found.is_none() {
            debug!(
                "No aggregator pool for {}/{} fee {} on {}",
                query.token0_address, query.token1_address, query.fee_tier, query.network
            );
        }
        Ok(found)
    }

    /// Drop the cached list so the next lookup refetches.
    pub async fn invalidate(&self) {
        *self.entry.write().await = None;
        info!("Pool cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockYieldSource;
    use crate::domain::Decimal;
    use std::str::FromStr;

    fn pool(apy: &str) -> YieldPool {
        YieldPool {
            pool: "p1".to_string(),
            chain: "Ethereum".to_string(),
            project: "uniswap-v3".to_string(),
            symbol: "USDC-WETH".to_string(),
            tvl_usd: Decimal::from_i64(1000),
            apy: Some(Decimal::from_str(apy).unwrap()),
            apy_base: None,
            pool_meta: Some("0.05%".to_string()),
            underlying_tokens: vec!["0xaaa".to_string(), "0xbbb".to_string()],
            volume_usd_1d: None,
            volume_usd_7d: None,
        }
    }

    fn query() -> PoolQuery {
        PoolQuery {
            token0_address: "0xAAA".to_string(),
            token1_address: "0xbbb".to_string(),
            fee_tier: 500,
            network: "ethereum".to_string(),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let source = Arc::new(MockYieldSource::new().with_pool(pool("20")));
        let cache = PoolAprCache::new(source.clone(), Duration::from_secs(300));

        cache.pools().await.unwrap();
        cache.pools().await.unwrap();

        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let source = Arc::new(MockYieldSource::new().with_pool(pool("20")));
        let cache = PoolAprCache::new(source.clone(), Duration::ZERO);

        cache.pools().await.unwrap();
        cache.pools().await.unwrap();

        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_served_on_failure() {
        let source = Arc::new(MockYieldSource::new().with_pool(pool("20")));
        let cache = PoolAprCache::new(source.clone(), Duration::ZERO);

        cache.pools().await.unwrap();
        source.set_failing(true);

        let data = cache.pool_apr(&query()).await.unwrap().unwrap();
        assert_eq!(data.apr, Decimal::from_i64(20));
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_error() {
        let source = Arc::new(MockYieldSource::new());
        source.set_failing(true);
        let cache = PoolAprCache::new(source, Duration::from_secs(300));

        assert!(cache.pools().await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(MockYieldSource::new().with_pool(pool("20")));
        let cache = PoolAprCache::new(source.clone(), Duration::from_secs(300));

        cache.pools().await.unwrap();
        cache.invalidate().await;
        cache.pools().await.unwrap();

        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_pool_apr_unknown_pool_is_none() {
        let source = Arc::new(MockYieldSource::new().with_pool(pool("20")));
        let cache = PoolAprCache::new(source, Duration::from_secs(300));

        let mut q = query();
        q.fee_tier = 3000;
        assert!(cache.pool_apr(&q).await.unwrap().is_none());
    }
}
