use crate::api::auth::{AdminUser, SessionUser};
use crate::api::AppState;
use crate::domain::{BillingDetails, BillingProfile, TimeMs, VerificationStatus, WalletAddress};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::Json;
use ethers::types::Signature;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingProfileDto {
    pub id: i64,
    pub wallet_address: String,
    pub full_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub is_default: bool,
    pub verification_hash: Option<String>,
    pub verification_status: VerificationStatus,
    pub verification_timestamp: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<BillingProfile> for BillingProfileDto {
    fn from(p: BillingProfile) -> Self {
        Self {
            id: p.id,
            wallet_address: p.wallet_address.to_string(),
            full_name: p.full_name,
            company_name: p.company_name,
            tax_id: p.tax_id,
            address: p.address,
            city: p.city,
            postal_code: p.postal_code,
            country: p.country,
            phone_number: p.phone_number,
            email: p.email,
            notes: p.notes,
            is_default: p.is_default,
            verification_hash: p.verification_hash,
            verification_status: p.verification_status,
            verification_timestamp: p.verification_timestamp.map(|t| t.as_ms()),
            created_at: p.created_at.as_ms(),
            updated_at: p.updated_at.as_ms(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetailsRequest {
    pub full_name: Option<String>,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
    /// Admin edits only.
    pub verification_status: Option<String>,
}

impl BillingDetailsRequest {
    fn details(&self) -> BillingDetails {
        BillingDetails {
            full_name: self.full_name.clone(),
            company_name: self.company_name.clone(),
            tax_id: self.tax_id.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            postal_code: self.postal_code.clone(),
            country: self.country.clone(),
            phone_number: self.phone_number.clone(),
            email: self.email.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifySignatureRequest {
    pub signature: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetVerificationRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Billing profile {} not found", id))
}

/// The caller's own profile.
pub async fn get_my_profile(
    State(state): State<AppState>,
    user: SessionUser,
) -> Result<Json<BillingProfileDto>, AppError> {
    let profile = state
        .repo
        .billing_profile_by_wallet(&user.session.wallet_address)
        .await?
        .ok_or_else(|| AppError::NotFound("No billing profile for this wallet".into()))?;
    Ok(Json(profile.into()))
}

/// Create or update the caller's profile. A new profile needs `fullName`.
pub async fn save_my_profile(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<BillingDetailsRequest>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let wallet = &user.session.wallet_address;
    let details = body.details();
    if details.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("fullName must not be empty".into()));
    }

    let existing = state.repo.billing_profile_by_wallet(wallet).await?;
    if existing.is_none() && details.full_name.is_none() {
        return Err(AppError::BadRequest("fullName is required".into()));
    }

    let profile = state
        .repo
        .upsert_billing_profile(wallet, &details, TimeMs::now())
        .await?;
    info!("Billing profile {} saved for {}", profile.id, wallet);
    Ok(Json(profile.into()))
}

/// Accept an EIP-191 signature of the profile's verification message made
/// by the session wallet.
pub async fn verify_my_profile(
    State(state): State<AppState>,
    user: SessionUser,
    Json(body): Json<VerifySignatureRequest>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let wallet = &user.session.wallet_address;
    let raw = body
        .signature
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("signature is required".into()))?;

    let profile = state
        .repo
        .billing_profile_by_wallet(wallet)
        .await?
        .ok_or_else(|| AppError::NotFound("No billing profile for this wallet".into()))?;

    let message = profile.verification_message();
    let signer = Signature::from_str(raw.trim())
        .ok()
        .and_then(|sig| sig.recover(message.as_str()).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;
    let signer = WalletAddress::from_str(&format!("{:?}", signer))
        .map_err(|_| AppError::BadRequest("Invalid signature format".into()))?;
    if &signer != wallet {
        warn!("Billing signature for {} recovered {}", wallet, signer);
        return Err(AppError::BadRequest("Invalid signature".into()));
    }

    let hash = profile.verification_hash_hex();
    let profile = state
        .repo
        .set_billing_verification(
            profile.id,
            VerificationStatus::Verified,
            Some(&hash),
            TimeMs::now(),
        )
        .await?
        .ok_or_else(|| not_found(profile.id))?;
    info!("Billing profile {} verified by signature", profile.id);
    Ok(Json(profile.into()))
}

pub async fn list_profiles(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<BillingProfileDto>>, AppError> {
    let profiles = state.repo.list_billing_profiles().await?;
    Ok(Json(profiles.into_iter().map(BillingProfileDto::from).collect()))
}

pub async fn get_profile(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let profile = state
        .repo
        .get_billing_profile(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(profile.into()))
}

pub async fn profile_by_wallet(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(wallet): Path<String>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let wallet = WalletAddress::from_str(&wallet)
        .map_err(|_| AppError::BadRequest("Invalid wallet address".into()))?;
    let profile = state
        .repo
        .billing_profile_by_wallet(&wallet)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No billing profile for {}", wallet)))?;
    Ok(Json(profile.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<BillingDetailsRequest>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let status = body
        .verification_status
        .as_deref()
        .map(VerificationStatus::from_str)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let profile = state
        .repo
        .update_billing_profile(id, &body.details(), status, TimeMs::now())
        .await?
        .ok_or_else(|| not_found(id))?;
    info!(
        "Billing profile {} edited by {}",
        profile.id, admin.session.wallet_address
    );
    Ok(Json(profile.into()))
}

/// Manual review outcome; only `Verified` or `Rejected`.
pub async fn set_verification(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<SetVerificationRequest>,
) -> Result<Json<BillingProfileDto>, AppError> {
    let status = VerificationStatus::from_str(&body.status).map_err(AppError::BadRequest)?;
    if status == VerificationStatus::Pending {
        return Err(AppError::BadRequest(
            "status must be Verified or Rejected".into(),
        ));
    }

    let profile = state
        .repo
        .set_billing_verification(id, status, None, TimeMs::now())
        .await?
        .ok_or_else(|| not_found(id))?;
    info!(
        "Billing profile {} set to {} by {}",
        profile.id, profile.verification_status, admin.session.wallet_address
    );
    Ok(Json(profile.into()))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, AppError> {
    if !state.repo.delete_billing_profile(id).await? {
        return Err(not_found(id));
    }
    info!(
        "Billing profile {} deleted by {}",
        id, admin.session.wallet_address
    );
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Billing profile {} deleted", id),
    }))
}
