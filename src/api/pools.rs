use crate::api::auth::AdminUser;
use crate::api::AppState;
use crate::datasource::PoolQuery;
use crate::db::is_unique_violation;
use crate::domain::{CustomPool, NewPool, TimeMs, WalletAddress, SUPPORTED_FEE_TIERS};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDto {
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
    pub cached_apr: Option<String>,
    pub cached_tvl: Option<String>,
    pub metrics_updated_at: Option<i64>,
}

impl From<CustomPool> for PoolDto {
    fn from(p: CustomPool) -> Self {
        Self {
            id: p.id,
            address: p.address,
            name: p.name,
            network: p.network,
            token0_symbol: p.token0_symbol,
            token1_symbol: p.token1_symbol,
            token0_address: p.token0_address,
            token1_address: p.token1_address,
            fee_tier: p.fee_tier,
            active: p.active,
            cached_apr: p.cached_apr.map(|d| d.to_canonical_string()),
            cached_tvl: p.cached_tvl.map(|d| d.to_canonical_string()),
            metrics_updated_at: p.metrics_updated_at.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolRequest {
    pub address: String,
    pub name: String,
    pub network: Option<String>,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub token0_address: String,
    pub token1_address: String,
    pub fee_tier: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolAprResponse {
    pub address: String,
    pub name: String,
    pub apr: String,
    pub tvl: Option<String>,
    pub volume_24h: Option<String>,
    pub fee_tier: String,
    /// `live` when served from the aggregator, `cached` for the stored fallback.
    pub source: String,
}

fn check_address(field: &str, value: &str) -> Result<String, AppError> {
    WalletAddress::from_str(value)
        .map(|a| a.to_string())
        .map_err(|_| AppError::BadRequest(format!("Invalid {}", field)))
}

pub async fn list_pools(State(state): State<AppState>) -> Result<Json<Vec<PoolDto>>, AppError> {
    let pools = state.repo.list_pools().await?;
    Ok(Json(pools.into_iter().map(PoolDto::from).collect()))
}

pub async fn create_pool(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<PoolDto>), AppError> {
    if !SUPPORTED_FEE_TIERS.contains(&body.fee_tier) {
        return Err(AppError::BadRequest(format!(
            "feeTier must be one of {:?}",
            SUPPORTED_FEE_TIERS
        )));
    }
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let new_pool = NewPool {
        address: check_address("address", &body.address)?,
        name: body.name.trim().to_string(),
        network: body.network.unwrap_or_else(|| "ethereum".to_string()),
        token0_symbol: body.token0_symbol,
        token1_symbol: body.token1_symbol,
        token0_address: check_address("token0Address", &body.token0_address)?,
        token1_address: check_address("token1Address", &body.token1_address)?,
        fee_tier: body.fee_tier,
        created_by: admin.session.wallet_address.to_string(),
    };

    let pool = state
        .repo
        .insert_pool(&new_pool, TimeMs::now())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Pool {} already exists", new_pool.address))
            } else {
                AppError::from(e)
            }
        })?;

    // The aggregator list may predate the new pool.
    state.pool_cache.invalidate().await;

    info!("Pool {} ({}) registered by {}", pool.name, pool.address, pool.created_by);
    Ok((StatusCode::CREATED, Json(pool.into())))
}

/// Live APR of a registered pool, falling back to its cached value.
pub async fn get_pool_apr(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<PoolAprResponse>, AppError> {
    let pool = state
        .repo
        .get_pool_by_address(&address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pool {} not found", address)))?;

    let live = match state.pool_cache.pool_apr(&PoolQuery::from(&pool)).await {
        Ok(found) => found,
        Err(e) => {
            warn!("APR lookup failed for pool {}: {}", pool.address, e);
            None
        }
    };

    match (live, pool.cached_apr) {
        (Some(data), _) => Ok(Json(PoolAprResponse {
            address: pool.address,
            name: pool.name,
            apr: data.apr.to_canonical_string(),
            tvl: Some(data.tvl.to_canonical_string()),
            volume_24h: Some(data.volume_24h.to_canonical_string()),
            fee_tier: data.fee_tier,
            source: "live".to_string(),
        })),
        (None, Some(cached)) => Ok(Json(PoolAprResponse {
            address: pool.address,
            name: pool.name,
            apr: cached.to_canonical_string(),
            tvl: pool.cached_tvl.map(|d| d.to_canonical_string()),
            volume_24h: None,
            fee_tier: crate::domain::fee_tier_label(pool.fee_tier).to_string(),
            source: "cached".to_string(),
        })),
        (None, None) => Err(AppError::NotFound(format!(
            "No APR data for pool {}",
            pool.address
        ))),
    }
}
