//! REST handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::state::AppState;
use crate::auth::CurrentUser;
use crate::chat::ChatMessage;
use crate::companion::CompanionSummary;
use crate::user::{SignupRequest, TokenResponse};

/// POST /api/v1/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let response = state.users.signup(request).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let response = state
        .users
        .login(&request.email, &request.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: &'static str,
}

/// POST /api/v1/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<LogoutResponse>> {
    state.users.logout(&user.session_pid).await?;
    info!(user_pid = %user.user_pid, "User logged out");
    Ok(Json(LogoutResponse {
        message: "Logged out",
    }))
}

/// GET /api/v1/companions
pub async fn list_companions(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Json<Vec<CompanionSummary>> {
    Json(state.companions.list())
}

/// GET /api/v1/companions/{code}/history
pub async fn chat_history(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(code): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    if state.companions.get(&code).is_none() {
        return Err(ApiError::not_found(format!("Companion not found: {}", code)));
    }

    let history = state
        .chat
        .history(&user.user_pid, &code)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_relay_sessions: usize,
}

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_relay_sessions: state.relays.active_count(),
    })
}
