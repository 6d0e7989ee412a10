//! User settings routes

use axum::{extract::State, routing::get, Json, Router};

use crate::auth::Owner;
use crate::db::{SettingsPatch, UserSettings};
use crate::error::Result;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// Settings are created with defaults on first read
async fn get_settings(State(state): State<AppState>, owner: Owner) -> Result<Json<UserSettings>> {
    let settings = state.settings().get_or_create(owner.id()).await?;
    Ok(Json(settings))
}

async fn update_settings(
    State(state): State<AppState>,
    owner: Owner,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<UserSettings>> {
    let settings = state.settings().update(owner.id(), patch).await?;
    Ok(Json(settings))
}
