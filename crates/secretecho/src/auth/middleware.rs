//! Request authentication.
//!
//! [`CurrentUser`] is the extractor protected handlers take. It resolves a
//! bearer credential (Authorization header, or `token` query parameter for
//! WebSocket upgrades) to a user identity backed by an active, non-expired
//! auth session. Downstream code trusts the resolved identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use tracing::debug;

use super::AuthError;
use crate::api::{ApiError, AppState};

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_pid: String,
    pub session_pid: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;

        let claims = state.auth.verify_token(&token)?;

        let session = state
            .users
            .session_by_pid(&claims.sid)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?
            .ok_or(AuthError::SessionNotFound)?;

        if session.deleted_at.is_some() {
            return Err(AuthError::SessionNotFound.into());
        }
        if session.expiry_at < Utc::now() {
            debug!(session_pid = %claims.sid, "auth session expired");
            return Err(AuthError::SessionExpired.into());
        }

        Ok(CurrentUser {
            user_pid: claims.sub,
            session_pid: claims.sid,
        })
    }
}

/// Pull the token from the Authorization header, falling back to the
/// `token` query parameter (browser WebSocket clients cannot set headers).
fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        if let Some(token) = header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "token" && !value.is_empty()).then(|| value.to_string())
        })
    })
}
