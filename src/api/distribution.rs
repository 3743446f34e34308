use crate::api::auth::AdminUser;
use crate::api::AppState;
use crate::db::DistributionRun;
use crate::error::AppError;
use crate::orchestration::{DistributionReport, SchedulerStatus, SystemInfo};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn status(State(state): State<AppState>, _admin: AdminUser) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

/// Manual run. Responds 409 while another run is in progress.
pub async fn run(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<DistributionReport>, AppError> {
    let executed_by = admin.session.wallet_address.to_string();
    tracing::info!("Manual distribution requested by {}", executed_by);
    let report = state.scheduler.run_now(&executed_by).await?;
    Ok(Json(report))
}

pub async fn preview(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<DistributionReport>, AppError> {
    Ok(Json(state.scheduler.service().preview().await?))
}

pub async fn info(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<SystemInfo>, AppError> {
    Ok(Json(state.scheduler.service().system_info().await?))
}

pub async fn history(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<Vec<DistributionRun>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    Ok(Json(state.repo.recent_distribution_runs(limit).await?))
}
