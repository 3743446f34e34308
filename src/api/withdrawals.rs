use crate::api::auth::{AdminUser, SessionUser};
use crate::api::AppState;
use crate::domain::{
    Decimal, FeeWithdrawal, NewWithdrawal, TimeMs, WithdrawalStatus, WithdrawalUpdate,
};
use crate::error::AppError;
use crate::orchestration::request_withdrawal;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalDto {
    pub id: i64,
    pub wallet_address: String,
    pub position_id: i64,
    pub pool_address: String,
    pub amount: String,
    pub currency: String,
    pub status: WithdrawalStatus,
    pub transaction_hash: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<i64>,
    pub requested_at: i64,
    pub apr_before_withdrawal: String,
    pub apr_after_withdrawal: String,
    pub apr_penalty_applied: bool,
    pub apr_penalty_amount: String,
}

impl From<FeeWithdrawal> for WithdrawalDto {
    fn from(w: FeeWithdrawal) -> Self {
        Self {
            id: w.id,
            wallet_address: w.wallet_address.to_string(),
            position_id: w.position_id,
            pool_address: w.pool_address,
            amount: w.amount.to_canonical_string(),
            currency: w.currency,
            status: w.status,
            transaction_hash: w.transaction_hash,
            notes: w.notes,
            processed_by: w.processed_by,
            processed_at: w.processed_at.map(|t| t.as_ms()),
            requested_at: w.requested_at.as_ms(),
            apr_before_withdrawal: w.apr_before_withdrawal.to_canonical_string(),
            apr_after_withdrawal: w.apr_after_withdrawal.to_canonical_string(),
            apr_penalty_applied: w.apr_penalty_applied,
            apr_penalty_amount: w.apr_penalty_amount.to_canonical_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawalRequest {
    pub position_id: i64,
    /// Decimal string to avoid float rounding.
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWithdrawalRequest {
    pub status: Option<String>,
    pub transaction_hash: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalWithdrawnResponse {
    pub position_id: i64,
    pub total_withdrawn: String,
}

fn parse_status(raw: &str) -> Result<WithdrawalStatus, AppError> {
    WithdrawalStatus::from_str(raw).map_err(AppError::BadRequest)
}

/// Admin listing, optionally filtered by `?status=`.
pub async fn list_withdrawals(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<WithdrawalDto>>, AppError> {
    let status = params.status.as_deref().map(parse_status).transpose()?;
    let withdrawals = state.repo.list_withdrawals(status).await?;
    Ok(Json(withdrawals.into_iter().map(WithdrawalDto::from).collect()))
}

pub async fn my_withdrawals(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<Vec<WithdrawalDto>>, AppError> {
    let withdrawals = state
        .repo
        .withdrawals_by_wallet(&user.session.wallet_address)
        .await?;
    Ok(Json(withdrawals.into_iter().map(WithdrawalDto::from).collect()))
}

pub async fn total_withdrawn(
    State(state): State<AppState>,
    user: SessionUser,
    Path(position_id): Path<i64>,
) -> Result<Json<TotalWithdrawnResponse>, AppError> {
    let total = state
        .repo
        .total_withdrawn(&user.session.wallet_address, position_id)
        .await?;
    Ok(Json(TotalWithdrawnResponse {
        position_id,
        total_withdrawn: total.to_canonical_string(),
    }))
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<CreateWithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalDto>), AppError> {
    let amount = Decimal::from_str(&body.amount)
        .map_err(|_| AppError::BadRequest("amount must be a decimal string".into()))?;

    let request = NewWithdrawal {
        wallet_address: user.session.wallet_address.clone(),
        position_id: body.position_id,
        amount,
        currency: body.currency.unwrap_or_else(|| "USDC".to_string()),
        notes: body.notes,
    };

    let withdrawal =
        request_withdrawal(&state.repo, &state.penalty, &request, TimeMs::now()).await?;
    Ok((StatusCode::CREATED, Json(withdrawal.into())))
}

pub async fn update_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateWithdrawalRequest>,
) -> Result<Json<WithdrawalDto>, AppError> {
    let update = WithdrawalUpdate {
        status: body.status.as_deref().map(parse_status).transpose()?,
        transaction_hash: body.transaction_hash,
        notes: body.notes,
    };

    let processed_by = admin.session.wallet_address.to_string();
    let withdrawal = state
        .repo
        .update_withdrawal(id, &update, &processed_by, TimeMs::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Withdrawal {} not found", id)))?;

    info!(
        "Withdrawal {} set to {} by {}",
        withdrawal.id, withdrawal.status, processed_by
    );
    Ok(Json(withdrawal.into()))
}
