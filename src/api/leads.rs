use crate::api::auth::AdminUser;
use crate::api::AppState;
use crate::domain::{Lead, LeadStatus, LeadUpdate, NewLead, TimeMs};
use crate::error::AppError;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDto {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub investment_size: String,
    pub message: Option<String>,
    pub consent_given: bool,
    pub status: LeadStatus,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub source: String,
    pub follow_up_date: Option<i64>,
    pub last_contact: Option<i64>,
    pub language_preference: String,
    pub original_referrer: Option<String>,
    pub additional_data: Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Lead> for LeadDto {
    fn from(l: Lead) -> Self {
        Self {
            id: l.id,
            full_name: l.full_name,
            email: l.email,
            phone: l.phone,
            company: l.company,
            investment_size: l.investment_size,
            message: l.message,
            consent_given: l.consent_given,
            status: l.status,
            assigned_to: l.assigned_to,
            notes: l.notes,
            source: l.source,
            follow_up_date: l.follow_up_date.map(|t| t.as_ms()),
            last_contact: l.last_contact.map(|t| t.as_ms()),
            language_preference: l.language_preference,
            original_referrer: l.original_referrer,
            additional_data: l.additional_data,
            created_at: l.created_at.as_ms(),
            updated_at: l.updated_at.as_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub phone_country_code: Option<String>,
    #[serde(default)]
    pub phone_formatted: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    pub investment_size: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub consent: bool,
    #[serde(default)]
    pub language_preference: Option<String>,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadRequest {
    pub status: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub assigned_to: Option<Option<String>>,
    /// RFC 3339 timestamp.
    #[serde(default, deserialize_with = "double_option")]
    pub follow_up_date: Option<Option<String>>,
    #[serde(default)]
    pub additional_data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadResponse {
    pub success: bool,
    pub message: String,
    pub lead_id: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdateLeadResponse {
    pub success: bool,
    pub message: String,
    pub lead: LeadDto,
}

fn validate_new_lead(body: &CreateLeadRequest) -> Result<(), AppError> {
    if body.full_name.trim().chars().count() < 2 {
        return Err(AppError::BadRequest(
            "fullName must be at least 2 characters".into(),
        ));
    }
    let email = body.email.trim();
    let valid_email = email
        .split_once('@')
        .map(|(user, domain)| !user.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid_email {
        return Err(AppError::BadRequest("email is not valid".into()));
    }
    if body.investment_size.trim().is_empty() {
        return Err(AppError::BadRequest("investmentSize is required".into()));
    }
    if !body.consent {
        return Err(AppError::BadRequest("consent must be given".into()));
    }
    Ok(())
}

fn parse_follow_up(raw: &str) -> Result<TimeMs, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| TimeMs::new(dt.timestamp_millis()))
        .map_err(|_| AppError::BadRequest("followUpDate must be an RFC 3339 timestamp".into()))
}

/// Public contact form endpoint.
pub async fn create_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<CreateLeadResponse>), AppError> {
    validate_new_lead(&body)?;

    let mut extra = Map::new();
    if let Some(code) = body.phone_country_code.filter(|c| !c.is_empty()) {
        extra.insert("phoneCountryCode".into(), json!(code));
    }
    if let Some(formatted) = body.phone_formatted.filter(|f| !f.is_empty()) {
        extra.insert("phoneFormatted".into(), json!(formatted));
    }

    let lead = NewLead {
        full_name: body.full_name.trim().to_string(),
        email: body.email.trim().to_string(),
        phone: body.phone,
        company: body.company,
        investment_size: body.investment_size,
        message: body.message,
        language_preference: body.language_preference.unwrap_or_else(|| "es".to_string()),
        original_referrer: headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        additional_data: (!extra.is_empty()).then_some(Value::Object(extra)),
    };

    let lead = state.repo.insert_lead(&lead, TimeMs::now()).await?;
    info!("Lead {} captured ({})", lead.id, lead.investment_size);

    Ok((
        StatusCode::CREATED,
        Json(CreateLeadResponse {
            success: true,
            message: "Lead created".to_string(),
            lead_id: lead.id,
        }),
    ))
}

pub async fn list_leads(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<LeadDto>>, AppError> {
    let leads = state.repo.list_leads().await?;
    Ok(Json(leads.into_iter().map(LeadDto::from).collect()))
}

pub async fn get_lead(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<LeadDto>, AppError> {
    let lead = state
        .repo
        .get_lead(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
    Ok(Json(lead.into()))
}

pub async fn update_lead(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLeadRequest>,
) -> Result<Json<UpdateLeadResponse>, AppError> {
    let status = body
        .status
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("status is required".into()))
        .and_then(|s| LeadStatus::from_str(s).map_err(AppError::BadRequest))?;

    let follow_up_date = match body.follow_up_date {
        Some(Some(raw)) => Some(Some(parse_follow_up(&raw)?)),
        Some(None) => Some(None),
        None => None,
    };
    if let Some(data) = &body.additional_data {
        if !data.is_object() {
            return Err(AppError::BadRequest("additionalData must be an object".into()));
        }
    }

    let update = LeadUpdate {
        status,
        notes: body.notes,
        assigned_to: body.assigned_to,
        follow_up_date,
        additional_data: body.additional_data,
    };

    let lead = state
        .repo
        .update_lead(id, &update, TimeMs::now())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;

    info!(
        "Lead {} set to {} by {}",
        lead.id, lead.status, admin.session.wallet_address
    );
    Ok(Json(UpdateLeadResponse {
        success: true,
        message: "Lead updated".to_string(),
        lead: lead.into(),
    }))
}
