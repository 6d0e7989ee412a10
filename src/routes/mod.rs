//! Route modules for Todo Sync Server

pub mod categories;
pub mod health;
pub mod settings;
pub mod sync;
pub mod todos;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/health", get(health::health_check))
        .nest("/todos", todos::router())
        .nest("/categories", categories::router())
        .nest("/settings", settings::router())
        .nest("/sync", sync::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::test_pool;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        app(AppState::new(Config::default(), test_pool().await))
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        owner: Option<i64>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(owner) = owner {
            request = request.header("x-user-id", owner.to_string());
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = test_app().await;

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, _) = call(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = test_app().await;

        let (status, body) = call(&app, Method::GET, "/api/v1/todos", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_todo_crud() {
        let app = test_app().await;

        let (status, created) = call(
            &app,
            Method::POST,
            "/api/v1/todos",
            Some(1),
            Some(json!({"title": "buy milk", "priority": 2, "tags": ["home"]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["priority"], 2);

        let (status, _) = call(&app, Method::GET, &format!("/api/v1/todos/{id}"), Some(2), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = call(
            &app,
            Method::PUT,
            &format!("/api/v1/todos/{id}"),
            Some(1),
            Some(json!({"completed": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["completed"], true);
        assert_eq!(updated["title"], "buy milk");

        let (status, found) = call(
            &app,
            Method::GET,
            "/api/v1/todos/search?keyword=MILK",
            Some(1),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.as_array().unwrap().len(), 1);

        let (status, _) =
            call(&app, Method::DELETE, &format!("/api/v1/todos/{id}"), Some(1), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = call(&app, Method::GET, "/api/v1/todos", Some(1), None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_priority_is_bad_request() {
        let app = test_app().await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/todos",
            Some(1),
            Some(json!({"title": "x", "priority": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid");
    }

    #[tokio::test]
    async fn test_duplicate_category_name() {
        let app = test_app().await;
        let body = json!({"name": "Work"});

        let (status, created) =
            call(&app, Method::POST, "/api/v1/categories", Some(1), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["color"], "#2196F3");

        let (status, _) =
            call(&app, Method::POST, "/api/v1/categories", Some(1), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Names are per owner
        let (status, _) = call(&app, Method::POST, "/api/v1/categories", Some(2), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_settings_defaults_and_update() {
        let app = test_app().await;

        let (status, settings) = call(&app, Method::GET, "/api/v1/settings", Some(1), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["theme"], "light");

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/settings",
            Some(1),
            Some(json!({"theme": "neon"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, settings) = call(
            &app,
            Method::PUT,
            "/api/v1/settings",
            Some(1),
            Some(json!({"theme": "dark"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["theme"], "dark");
    }

    #[tokio::test]
    async fn test_sync_round_trip() {
        let app = test_app().await;

        let (_, version) = call(&app, Method::GET, "/api/v1/sync/version", Some(1), None).await;
        assert_eq!(version["version"], 0);

        let (status, pushed) = call(
            &app,
            Method::POST,
            "/api/v1/sync/batch",
            Some(1),
            Some(json!({
                "todos": [
                    {"title": "offline one", "priority": 1, "tags": [], "sync_version": 0, "updated_at": ""},
                    {"id": 555, "title": "ghost", "sync_version": 0, "updated_at": ""}
                ],
                "settings": {"theme": "auto", "notification_time": "07:30", "language": "", "timezone": "", "sync_version": 0, "updated_at": ""}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pushed["success"].as_array().unwrap().len(), 2);
        assert_eq!(pushed["success"][0]["action"], "created");
        assert_eq!(pushed["success"][1]["type"], "settings");
        assert!(pushed["conflicts"].as_array().unwrap().is_empty());
        assert_eq!(pushed["errors"][0]["local_id"], 555);

        let (_, version) = call(&app, Method::GET, "/api/v1/sync/version", Some(1), None).await;
        let ceiling = version["version"].as_i64().unwrap();
        assert!(ceiling > 0);

        let (status, pulled) = call(
            &app,
            Method::POST,
            "/api/v1/sync/pull",
            Some(1),
            Some(json!({"since": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pulled["server_version"], ceiling);
        assert_eq!(pulled["todos"][0]["title"], "offline one");
        assert_eq!(pulled["settings"]["notification_time"], "07:30:00");

        let (_, empty) = call(
            &app,
            Method::POST,
            "/api/v1/sync/pull",
            Some(1),
            Some(json!({"since": ceiling})),
        )
        .await;
        assert!(empty["todos"].as_array().unwrap().is_empty());
        assert!(empty["categories"].as_array().unwrap().is_empty());
        assert!(empty.get("settings").is_none());

        // Another owner sees nothing
        let (_, theirs) = call(
            &app,
            Method::POST,
            "/api/v1/sync/pull",
            Some(2),
            Some(json!({"since": 0})),
        )
        .await;
        assert!(theirs["todos"].as_array().unwrap().is_empty());
        assert_eq!(theirs["server_version"], 0);
    }
}
