//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::auth::Identity;

// ============================================================================
// Session
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: Identity,
}

// ============================================================================
// Embed tokens
// ============================================================================

/// Query parameters for an embed token.
#[derive(Debug, Default, Deserialize)]
pub struct EmbedTokenQuery {
    #[serde(default)]
    pub workbook: Option<String>,
    #[serde(default)]
    pub view: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedTokenResponse {
    pub embed_token: String,
    pub server_url: String,
    pub site: String,
    pub workbook: String,
    pub view: String,
    pub viz_url: String,
    /// Unix timestamp.
    pub expires_at: u64,
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    /// "live" or "static".
    pub mode: String,
    /// Workbook cache state.
    pub cache: String,
    pub version: String,
    pub uptime_seconds: u64,
}
