//! REST API routes and handlers.

mod embed;
mod health;
mod session;
pub mod types;
mod workbooks;

use std::sync::Arc;

use axum::{
    Router,
    extract::OriginalUri,
    middleware,
    routing::{get, post},
};

use crate::auth::require_session;
use crate::error::AppError;
use crate::state::AppState;

pub use types::{EmbedTokenResponse, HealthResponse, LoginRequest, LoginResponse, VerifyResponse};

/// Create the API routes.
///
/// Unknown paths under the API answer with a JSON 404 instead of falling
/// through to the portal.
pub fn routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/verify", get(session::verify))
        .route("/tableau-token", get(embed::tableau_token))
        .route("/workbooks", get(workbooks::list_workbooks))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(state),
            require_session,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/login", post(session::login))
        .merge(protected)
        .fallback(not_found)
}

async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}
