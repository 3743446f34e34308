use crate::api::auth::SessionUser;
use crate::api::AppState;
use crate::domain::{Decimal, NewPosition, Position, TimeMs, Timeframe};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub id: i64,
    pub wallet_address: String,
    pub pool_address: String,
    pub pool_name: String,
    pub token_pair: Option<String>,
    pub network: String,
    #[serde(rename = "depositedUSDC")]
    pub deposited_usdc: String,
    pub apr: String,
    pub current_apr: Option<String>,
    pub apr_penalty: String,
    pub fees_earned: String,
    pub fees_collected: String,
    pub available_fees: String,
    pub timeframe: i64,
    pub status: String,
    pub last_apr_update: Option<i64>,
    pub last_accrual_date: Option<String>,
    pub start_ms: i64,
    pub closed_ms: Option<i64>,
}

impl From<Position> for PositionDto {
    fn from(p: Position) -> Self {
        let available = p.available_fees();
        Self {
            id: p.id,
            wallet_address: p.wallet_address.to_string(),
            pool_address: p.pool_address,
            pool_name: p.pool_name,
            token_pair: p.token_pair,
            network: p.network,
            deposited_usdc: p.deposited_usdc.to_canonical_string(),
            apr: p.apr.to_canonical_string(),
            current_apr: p.current_apr.map(|d| d.to_canonical_string()),
            apr_penalty: p.apr_penalty.to_canonical_string(),
            fees_earned: p.fees_earned.to_canonical_string(),
            fees_collected: p.fees_collected.to_canonical_string(),
            available_fees: available.to_canonical_string(),
            timeframe: p.timeframe.days(),
            status: p.status.to_string(),
            last_apr_update: p.last_apr_update.map(|t| t.as_ms()),
            last_accrual_date: p.last_accrual_date.map(|d| d.to_string()),
            start_ms: p.start_ms.as_ms(),
            closed_ms: p.closed_ms.map(|t| t.as_ms()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePositionRequest {
    pub pool_address: String,
    #[serde(default)]
    pub pool_name: Option<String>,
    #[serde(default)]
    pub token_pair: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    /// Decimal string to avoid float rounding.
    #[serde(rename = "depositedUSDC")]
    pub deposited_usdc: String,
    pub apr: String,
    pub timeframe: i64,
}

/// Largest deposit a single position may hold, in USDC.
pub const MAX_DEPOSIT_USDC: i64 = 1_000_000_000;

fn parse_positive(field: &str, value: &str) -> Result<Decimal, AppError> {
    let parsed = Decimal::from_str(value)
        .map_err(|_| AppError::BadRequest(format!("{} must be a decimal string", field)))?;
    if !parsed.is_positive() {
        return Err(AppError::BadRequest(format!("{} must be positive", field)));
    }
    Ok(parsed)
}

pub async fn list_positions(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Vec<PositionDto>>, AppError> {
    let positions = state
        .repo
        .positions_by_wallet(&user.session.wallet_address)
        .await?;
    Ok(Json(positions.into_iter().map(PositionDto::from).collect()))
}

/// Open a position in a registered pool.
pub async fn create_position(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<CreatePositionRequest>,
) -> Result<(StatusCode, Json<PositionDto>), AppError> {
    let deposited_usdc = parse_positive("depositedUSDC", &body.deposited_usdc)?;
    if deposited_usdc > Decimal::from_i64(MAX_DEPOSIT_USDC) {
        return Err(AppError::BadRequest(format!(
            "depositedUSDC must not exceed {}",
            MAX_DEPOSIT_USDC
        )));
    }
    let apr = parse_positive("apr", &body.apr)?;
    if body.timeframe <= 0 {
        return Err(AppError::BadRequest("timeframe must be positive".into()));
    }

    let pool = state
        .repo
        .get_pool_by_address(&body.pool_address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pool {} not found", body.pool_address)))?;
    if !pool.active {
        return Err(AppError::BadRequest(format!("Pool {} is not active", pool.address)));
    }

    let new_position = NewPosition {
        wallet_address: user.session.wallet_address.clone(),
        pool_address: pool.address.clone(),
        pool_name: body.pool_name.unwrap_or_else(|| pool.name.clone()),
        token_pair: body
            .token_pair
            .or_else(|| Some(format!("{}/{}", pool.token0_symbol, pool.token1_symbol))),
        network: body.network.unwrap_or_else(|| pool.network.clone()),
        deposited_usdc,
        apr,
        timeframe: Timeframe(body.timeframe),
    };

    let position = state
        .repo
        .insert_position(&new_position, TimeMs::now())
        .await?;
    info!(
        "Position {} opened by {} in {} ({} USDC, {})",
        position.id,
        position.wallet_address,
        position.pool_name,
        position.deposited_usdc,
        position.timeframe
    );
    Ok((StatusCode::CREATED, Json(position.into())))
}

async fn load_visible(
    state: &AppState,
    user: &SessionUser,
    id: i64,
) -> Result<Position, AppError> {
    let position = state
        .repo
        .get_position(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Position {} not found", id)))?;
    if position.wallet_address != user.session.wallet_address && !user.session.is_admin {
        return Err(AppError::Forbidden("Position belongs to another wallet".into()));
    }
    Ok(position)
}

pub async fn get_position(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<i64>,
) -> Result<Json<PositionDto>, AppError> {
    Ok(Json(load_visible(&state, &user, id).await?.into()))
}

pub async fn close_position(
    State(state): State<AppState>,
    user: SessionUser,
    Path(id): Path<i64>,
) -> Result<Json<PositionDto>, AppError> {
    let position = load_visible(&state, &user, id).await?;
    if position.wallet_address != user.session.wallet_address {
        return Err(AppError::Forbidden("Only the owner can close a position".into()));
    }
    if !state.repo.close_position(id, TimeMs::now()).await? {
        return Err(AppError::BadRequest(format!("Position {} is already closed", id)));
    }
    info!("Position {} closed by {}", id, user.session.wallet_address);

    let closed = state
        .repo
        .get_position(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Position {} not found", id)))?;
    Ok(Json(closed.into()))
}
