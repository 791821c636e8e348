//! Embed token endpoint.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use tracing::info;

use crate::auth::Identity;
use crate::error::AppResult;
use crate::state::AppState;

use super::types::{EmbedTokenQuery, EmbedTokenResponse};

/// Mint an embed token for the requested workbook and view.
pub async fn tableau_token(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EmbedTokenQuery>,
) -> AppResult<Json<EmbedTokenResponse>> {
    let minted = state.minter.mint(
        &identity,
        query.workbook.as_deref(),
        query.view.as_deref(),
    )?;

    info!(
        username = %identity.username,
        workbook = %minted.workbook(),
        view = %minted.view(),
        "Issued embed token"
    );

    Ok(Json(EmbedTokenResponse {
        server_url: state.minter.server_url().to_string(),
        site: state.minter.site().to_string(),
        workbook: minted.workbook().to_string(),
        view: minted.view().to_string(),
        viz_url: minted.viz_url,
        expires_at: minted.claims.exp,
        embed_token: minted.token,
    }))
}
