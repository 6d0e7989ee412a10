//! Error types for the Todo Sync server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// User-visible message, with storage causes hidden.
    pub fn message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::DuplicateName(msg)
            | AppError::Invalid(msg)
            | AppError::Unauthorized(msg) => msg.clone(),
            AppError::Internal(_) | AppError::Database(_) | AppError::Encoding(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::DuplicateName(_) => (StatusCode::CONFLICT, "duplicate_name"),
            AppError::Invalid(_) => (StatusCode::BAD_REQUEST, "invalid"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            AppError::Encoding(e) => {
                tracing::error!("Encoding error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "encoding_error")
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.message(),
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_message_is_hidden() {
        let err = AppError::Internal("disk on fire".to_string());
        assert_eq!(err.message(), "An internal error occurred");

        let err = AppError::not_found("todo 7 not found");
        assert_eq!(err.message(), "todo 7 not found");
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::not_found("x"), StatusCode::NOT_FOUND),
            (AppError::DuplicateName("x".into()), StatusCode::CONFLICT),
            (AppError::invalid("x"), StatusCode::BAD_REQUEST),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
