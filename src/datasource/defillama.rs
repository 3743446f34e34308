//! DefiLlama yields API client.

use super::{DataSourceError, YieldPool, YieldSource, UNISWAP_V3_PROJECT};
use crate::domain::Decimal;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Yield aggregator data source using the public `/pools` endpoint.
#[derive(Debug, Clone)]
pub struct DefiLlamaSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    data: Vec<RawPool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPool {
    pool: String,
    chain: String,
    project: String,
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    tvl_usd: Option<f64>,
    #[serde(default)]
    apy: Option<f64>,
    #[serde(default)]
    apy_base: Option<f64>,
    #[serde(default)]
    pool_meta: Option<String>,
    #[serde(default)]
    underlying_tokens: Option<Vec<String>>,
    #[serde(default)]
    volume_usd1d: Option<f64>,
    #[serde(default)]
    volume_usd7d: Option<f64>,
}

impl DefiLlamaSource {
    /// Create a new source against `base_url` (e.g. `https://yields.llama.fi`).
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_pools(&self) -> Result<PoolsResponse, DataSourceError> {
        let url = format!("{}/pools", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(&url).send().await.map_err(|e| {
                backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<PoolsResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl YieldSource for DefiLlamaSource {
    async fn fetch_pools(&self) -> Result<Vec<YieldPool>, DataSourceError> {
        debug!("Fetching yield pools from {}", self.base_url);
        let response = self.get_pools().await?;
        let pools = filter_uniswap_v3(response.data);
        info!("Loaded {} Uniswap V3 pools from yield aggregator", pools.len());
        Ok(pools)
    }
}

fn filter_uniswap_v3(raw: Vec<RawPool>) -> Vec<YieldPool> {
    raw.into_iter()
        .filter(|p| p.project == UNISWAP_V3_PROJECT)
        .filter_map(|p| {
            let pool_id = p.pool.clone();
            let converted = convert_pool(p);
            if converted.is_none() {
                warn!("Skipping pool {} with non-finite metrics", pool_id);
            }
            converted
        })
        .collect()
}

fn convert_pool(raw: RawPool) -> Option<YieldPool> {
    let opt = |v: Option<f64>| -> Option<Option<Decimal>> {
        match v {
            None => Some(None),
            Some(x) => Decimal::from_f64(x).map(Some),
        }
    };

    Some(YieldPool {
        pool: raw.pool,
        chain: raw.chain,
        project: raw.project,
        symbol: raw.symbol,
        tvl_usd: opt(raw.tvl_usd)?.unwrap_or_default(),
        apy: opt(raw.apy)?,
        apy_base: opt(raw.apy_base)?,
        pool_meta: raw.pool_meta,
        underlying_tokens: raw.underlying_tokens.unwrap_or_default(),
        volume_usd_1d: opt(raw.volume_usd1d)?,
        volume_usd_7d: opt(raw.volume_usd7d)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_filter_response() {
        let body = serde_json::json!({
            "status": "success",
            "data": [
                {
                    "pool": "aaa",
                    "chain": "Ethereum",
                    "project": "uniswap-v3",
                    "symbol": "USDC-WETH",
                    "tvlUsd": 250000000.0,
                    "apy": 18.25,
                    "apyBase": 18.25,
                    "poolMeta": "0.05%",
                    "underlyingTokens": ["0xa", "0xb"],
                    "volumeUsd1d": 1200000.5,
                    "volumeUsd7d": null
                },
                {
                    "pool": "bbb",
                    "chain": "Ethereum",
                    "project": "aave-v3",
                    "symbol": "USDC",
                    "tvlUsd": 1.0,
                    "apy": 4.0
                },
                {
                    "pool": "ccc",
                    "chain": "Polygon",
                    "project": "uniswap-v3",
                    "symbol": "WMATIC-USDC",
                    "tvlUsd": 10.0,
                    "apy": null,
                    "apyBase": 7.5,
                    "poolMeta": "0.3%",
                    "underlyingTokens": null
                }
            ]
        });

        let response: PoolsResponse = serde_json::from_value(body).unwrap();
        let pools = filter_uniswap_v3(response.data);

        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].pool, "aaa");
        assert_eq!(pools[0].apr().to_canonical_string(), "18.25");
        assert_eq!(pools[0].underlying_tokens.len(), 2);
        assert_eq!(pools[0].volume_usd_7d, None);
        assert_eq!(pools[1].apr().to_canonical_string(), "7.5");
        assert!(pools[1].underlying_tokens.is_empty());
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let source = DefiLlamaSource::new("https://yields.example/".to_string());
        assert_eq!(source.base_url, "https://yields.example");
    }
}
