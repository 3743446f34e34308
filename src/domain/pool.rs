//! Uniswap pools the platform offers (`custom_pools`).

use crate::domain::{Decimal, TimeMs};
use serde::Serialize;

/// A pool with its last-known metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPool {
    pub id: i64,
    pub address: String,
    pub name: String,
    pub network: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub token0_address: String,
    pub token1_address: String,
    pub fee_tier: i64,
    pub active: bool,
    pub cached_apr: Option<Decimal>,
    pub cached_tvl: Option<Decimal>,
    pub metrics_updated_at: Option<TimeMs>,
    pub created_by: String,
}

/// Input for registering a pool.
#[derive(Debug, Clone)]
pub struct NewPool {
    pub address: String,
    pub name: String,
    pub network: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub token0_address: String,
    pub token1_address: String,
    pub fee_tier: i64,
    pub created_by: String,
}

/// Fee tiers Uniswap v3 supports, in hundredths of a basis point.
pub const SUPPORTED_FEE_TIERS: [i64; 4] = [100, 500, 3000, 10000];

/// Label the yield aggregator uses for a fee tier (`poolMeta`).
///
/// Unknown tiers map to the 0.3% label.
pub fn fee_tier_label(fee_tier: i64) -> &'static str {
    match fee_tier {
        100 => "0.01%",
        500 => "0.05%",
        3000 => "0.3%",
        10000 => "1%",
        _ => "0.3%",
    }
}

/// Chain name as the aggregator spells it (`ethereum` -> `Ethereum`).
pub fn chain_label(network: &str) -> String {
    let lower = network.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
