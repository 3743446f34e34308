use crate::api::auth::AdminUser;
use crate::api::AppState;
use crate::domain::{Decimal, TimeMs, Timeframe, TimeframeAdjustment};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentDto {
    pub timeframe: i64,
    pub adjustment_percentage: String,
    pub description: String,
    pub updated_at: Option<i64>,
    pub updated_by: Option<String>,
}

impl From<TimeframeAdjustment> for AdjustmentDto {
    fn from(a: TimeframeAdjustment) -> Self {
        Self {
            timeframe: a.timeframe.days(),
            adjustment_percentage: a.adjustment_percentage.to_canonical_string(),
            description: a.description,
            updated_at: a.updated_at.map(|t| t.as_ms()),
            updated_by: a.updated_by,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdjustmentRequest {
    pub adjustment_percentage: String,
    pub description: Option<String>,
}

pub async fn list_adjustments(
    State(state): State<AppState>,
) -> Result<Json<Vec<AdjustmentDto>>, AppError> {
    let adjustments = state.repo.list_adjustments().await?;
    Ok(Json(adjustments.into_iter().map(AdjustmentDto::from).collect()))
}

pub async fn update_adjustment(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(timeframe): Path<i64>,
    Json(body): Json<UpdateAdjustmentRequest>,
) -> Result<Json<AdjustmentDto>, AppError> {
    if timeframe <= 0 {
        return Err(AppError::BadRequest("timeframe must be positive".into()));
    }
    let percentage = Decimal::from_str(&body.adjustment_percentage).map_err(|_| {
        AppError::BadRequest("adjustmentPercentage must be a decimal string".into())
    })?;
    // Below -100% the adjusted APR would flip sign.
    if percentage < -Decimal::hundred() {
        return Err(AppError::BadRequest(
            "adjustmentPercentage must be >= -100".into(),
        ));
    }

    let updated_by = admin.session.wallet_address.to_string();
    let adjustment = state
        .repo
        .upsert_adjustment(
            Timeframe(timeframe),
            percentage,
            body.description.as_deref(),
            &updated_by,
            TimeMs::now(),
        )
        .await?;

    info!(
        "Timeframe {} adjustment set to {}% by {}",
        adjustment.timeframe, adjustment.adjustment_percentage, updated_by
    );
    Ok(Json(adjustment.into()))
}
