//! Category API routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::auth::Owner;
use crate::db::{Category, CategoryPatch, NewCategory};
use crate::error::Result;
use crate::state::AppState;

/// Create the categories router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/:id", put(update_category).delete(delete_category))
}

async fn list_categories(
    State(state): State<AppState>,
    owner: Owner,
) -> Result<Json<Vec<Category>>> {
    let categories = state.categories().list(owner.id()).await?;
    Ok(Json(categories))
}

async fn create_category(
    State(state): State<AppState>,
    owner: Owner,
    Json(data): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>)> {
    let fields = data.into_fields()?;
    let category = state.categories().create(owner.id(), &fields).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<i64>,
    Json(patch): Json<CategoryPatch>,
) -> Result<Json<Category>> {
    let category = state.categories().update(owner.id(), id, patch).await?;
    Ok(Json(category))
}

async fn delete_category(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.categories().delete(owner.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
