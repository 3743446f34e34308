//! Data source abstraction for pool yield data from an external aggregator.

use crate::domain::{chain_label, fee_tier_label, CustomPool, Decimal, TimeMs};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub mod cache;
pub mod defillama;
pub mod mock;

pub use cache::PoolAprCache;
pub use defillama::DefiLlamaSource;
pub use mock::MockYieldSource;

/// Project slug the aggregator uses for Uniswap v3 pools.
pub const UNISWAP_V3_PROJECT: &str = "uniswap-v3";

/// Source of the full Uniswap v3 pool list with yield metrics.
///
/// Implementations must handle retry/backoff; caching lives in [`PoolAprCache`].
#[async_trait]
pub trait YieldSource: Send + Sync + fmt::Debug {
    /// Fetch every Uniswap v3 pool known to the aggregator.
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, DataSourceError>;
}

/// One pool entry as reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YieldPool {
    /// Aggregator pool id.
    pub pool: String,
    pub chain: String,
    pub project: String,
    pub symbol: String,
    pub tvl_usd: Decimal,
    pub apy: Option<Decimal>,
    pub apy_base: Option<Decimal>,
    /// Fee tier label, e.g. `0.05%`.
    pub pool_meta: Option<String>,
    pub underlying_tokens: Vec<String>,
    pub volume_usd_1d: Option<Decimal>,
    pub volume_usd_7d: Option<Decimal>,
}

impl YieldPool {
    /// Headline APR: total APY, then base APY, then zero. Zero values fall
    /// through to the next candidate.
    pub fn apr(&self) -> Decimal {
        self.apy
            .filter(|d| !d.is_zero())
            .or(self.apy_base.filter(|d| !d.is_zero()))
            .unwrap_or_default()
    }
}

/// What identifies a pool on the aggregator side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolQuery {
    pub token0_address: String,
    pub token1_address: String,
    pub fee_tier: i64,
    pub network: String,
}

impl From<&CustomPool> for PoolQuery {
    fn from(pool: &CustomPool) -> Self {
        Self {
            token0_address: pool.token0_address.clone(),
            token1_address: pool.token1_address.clone(),
            fee_tier: pool.fee_tier,
            network: pool.network.clone(),
        }
    }
}

/// APR metrics for one matched pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAprData {
    pub pool_id: String,
    pub pool_name: String,
    pub apr: Decimal,
    pub tvl: Decimal,
    pub volume_24h: Decimal,
    pub volume_7d: Decimal,
    pub fee_tier: String,
    pub chain: String,
    pub fetched_at: TimeMs,
}

/// Find the pool matching chain, fee tier and both tokens (in any order).
pub fn find_pool<'a>(pools: &'a [YieldPool], query: &PoolQuery) -> Option<&'a YieldPool> {
    let token0 = query.token0_address.to_lowercase();
    let token1 = query.token1_address.to_lowercase();
    let target_fee = fee_tier_label(query.fee_tier);
    let target_chain = chain_label(&query.network);

    pools.iter().find(|pool| {
        if pool.chain != target_chain || pool.pool_meta.as_deref() != Some(target_fee) {
            return false;
        }
        let has = |addr: &str| {
            pool.underlying_tokens
                .iter()
                .any(|t| t.to_lowercase() == addr)
        };
        has(&token0) && has(&token1)
    })
}

/// Build the APR record for a matched pool.
pub fn to_apr_data(pool: &YieldPool, fetched_at: TimeMs) -> PoolAprData {
    PoolAprData {
        pool_id: pool.pool.clone(),
        pool_name: pool.symbol.clone(),
        apr: pool.apr(),
        tvl: pool.tvl_usd,
        volume_24h: pool.volume_usd_1d.unwrap_or_default(),
        volume_7d: pool.volume_usd_7d.unwrap_or_default(),
        fee_tier: pool.pool_meta.clone().unwrap_or_default(),
        chain: pool.chain.clone(),
        fetched_at,
    }
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}
