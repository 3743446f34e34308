use crate::api::auth::{AdminUser, SessionUser};
use crate::api::AppState;
use crate::domain::WalletAddress;
use crate::error::AppError;
use crate::session::{Session, SessionStats};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub wallet_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: String,
    pub wallet_address: String,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub valid: bool,
    pub wallet_address: String,
    pub is_admin: bool,
    pub login_time: i64,
    pub last_activity: i64,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            valid: true,
            wallet_address: session.wallet_address.to_string(),
            is_admin: session.is_admin,
            login_time: session.login_time.as_ms(),
            last_activity: session.last_activity.as_ms(),
        }
    }
}

/// Open a session for the posted wallet.
///
/// Admin rights come from `ADMIN_WALLETS` membership alone; the caller does
/// not prove ownership of the wallet, so this endpoint trusts whoever posts
/// an address and must sit behind a front end that has already verified it.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    let wallet = WalletAddress::from_str(&body.wallet_address)
        .map_err(|_| AppError::BadRequest("Invalid wallet address".into()))?;
    let is_admin = state.config.is_admin(&wallet);
    let session_id = state.sessions.create_session(wallet.clone(), is_admin).await;

    Ok((
        StatusCode::CREATED,
        Json(LoginResponse {
            session_id,
            wallet_address: wallet.to_string(),
            is_admin,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    user: SessionUser,
) -> Json<serde_json::Value> {
    let removed = state.sessions.destroy_session(&user.token).await;
    Json(serde_json::json!({"success": removed}))
}

pub async fn validate(user: SessionUser) -> Json<SessionResponse> {
    Json(user.session.into())
}

pub async fn renew(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<SessionResponse>, AppError> {
    if !state.sessions.renew_session(&user.token).await {
        return Err(AppError::Unauthorized("Invalid or expired session".into()));
    }
    let session = state
        .sessions
        .validate_session(&user.token)
        .await
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".into()))?;
    Ok(Json(session.into()))
}

pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Json<SessionStats> {
    Json(state.sessions.stats().await)
}
