//! Workbook listing endpoint.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::directory::DirectoryListing;
use crate::state::AppState;

/// List the workbooks available for embedding.
///
/// Never fails: an unreachable server yields the fallback list.
pub async fn list_workbooks(State(state): State<Arc<AppState>>) -> Json<DirectoryListing> {
    Json(state.directory.list().await)
}
