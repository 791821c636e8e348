//! Login and token verification endpoints.

use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use crate::auth::Identity;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

use super::types::{LoginRequest, LoginResponse, VerifyResponse};

/// Exchange a username and password for a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    // Argon2 verification is CPU-bound.
    let token = tokio::task::spawn_blocking(move || {
        state.sessions.login(&request.username, &request.password)
    })
    .await
    .map_err(|e| AppError::Internal(format!("login task failed: {e}")))??;

    Ok(Json(LoginResponse { token }))
}

/// Report the identity carried by the caller's token.
pub async fn verify(Extension(identity): Extension<Identity>) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        user: identity,
    })
}
