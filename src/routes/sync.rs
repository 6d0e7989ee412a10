//! Sync API endpoints
//!
//! Version check, incremental pull and batch push for offline clients.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::auth::Owner;
use crate::error::Result;
use crate::state::AppState;
use crate::sync::{
    partition, BatchSyncRequest, BatchSyncResponse, PullRequest, PullResponse, VersionResponse,
};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/version", get(get_version))
        .route("/pull", post(pull_changes))
        .route("/batch", post(push_batch))
}

/// Highest version the caller can currently pull
async fn get_version(State(state): State<AppState>, owner: Owner) -> Result<Json<VersionResponse>> {
    let version = state.sync_reader().server_version(owner.id()).await?;
    Ok(Json(VersionResponse { version }))
}

/// Pull everything changed after `since`
async fn pull_changes(
    State(state): State<AppState>,
    owner: Owner,
    Json(req): Json<PullRequest>,
) -> Result<Json<PullResponse>> {
    let snapshot = state.sync_reader().pull(owner.id(), req.since).await?;
    Ok(Json(PullResponse::from(snapshot)))
}

/// Push local changes; per-item failures are reported, never raised
async fn push_batch(
    State(state): State<AppState>,
    owner: Owner,
    Json(req): Json<BatchSyncRequest>,
) -> Json<BatchSyncResponse> {
    let results = state.conflict_resolver().reconcile(owner.id(), &req).await;
    Json(partition(results))
}
