//! Todo API routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::auth::Owner;
use crate::db::{page_bounds, NewTodo, Todo, TodoPatch};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the todos router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_todos).post(create_todo))
        .route("/search", get(search_todos))
        .route("/:id", get(get_todo).put(update_todo).delete(delete_todo))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List live todos, newest first
async fn list_todos(
    State(state): State<AppState>,
    owner: Owner,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Todo>>> {
    let (limit, offset) = page_bounds(query.limit, query.offset);
    let todos = state.todos().list(owner.id(), limit, offset).await?;
    Ok(Json(todos))
}

async fn search_todos(
    State(state): State<AppState>,
    owner: Owner,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Todo>>> {
    let keyword = query.keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::invalid("keyword must not be empty"));
    }

    let (limit, offset) = page_bounds(query.limit, query.offset);
    let todos = state
        .todos()
        .search(owner.id(), keyword, limit, offset)
        .await?;
    Ok(Json(todos))
}

async fn create_todo(
    State(state): State<AppState>,
    owner: Owner,
    Json(data): Json<NewTodo>,
) -> Result<(StatusCode, Json<Todo>)> {
    let fields = data.into_fields()?;
    let todo = state.todos().create(owner.id(), &fields).await?;
    tracing::info!(owner_id = owner.id(), id = todo.id, "created todo");
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn get_todo(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<i64>,
) -> Result<Json<Todo>> {
    let todo = state.todos().get(owner.id(), id).await?;
    Ok(Json(todo))
}

async fn update_todo(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<i64>,
    Json(patch): Json<TodoPatch>,
) -> Result<Json<Todo>> {
    let todo = state.todos().update(owner.id(), id, patch).await?;
    Ok(Json(todo))
}

/// Soft delete; the tombstone is still delivered by sync pull
async fn delete_todo(
    State(state): State<AppState>,
    owner: Owner,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    state.todos().delete(owner.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
