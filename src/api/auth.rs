//! Session extractors for handlers.
//!
//! The token is read from `X-Session-Id`, falling back to
//! `Authorization: Bearer <token>`.

use crate::api::AppState;
use crate::error::AppError;
use crate::session::Session;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

pub const SESSION_HEADER: &str = "x-session-id";

/// Session token carried by the request, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    match headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(auth) => auth
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        None => None,
    }
}

/// A request with a valid session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub token: String,
    pub session: Session,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
        let session = state
            .sessions
            .validate_session(&token)
            .await
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired session".into()))?;
        Ok(SessionUser { token, session })
    }
}

/// A request with a valid admin session.
#[derive(Debug, Clone)]
pub struct AdminUser(pub SessionUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = SessionUser::from_request_parts(parts, state).await?;
        if !user.session.is_admin {
            tracing::warn!(
                "Non-admin wallet {} denied on {}",
                user.session.wallet_address,
                parts.uri.path()
            );
            return Err(AppError::Forbidden("Admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc"));
        headers.insert("authorization", HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_bearer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_missing_or_malformed() {
        assert!(session_token(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic xyz"));
        assert!(session_token(&headers).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("  "));
        assert!(session_token(&headers).is_none());
    }
}
