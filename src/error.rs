use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Queue cleared")]
    QueueCleared,

    #[error("Internal server error")]
    InternalServerError,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::QueueCleared => (StatusCode::SERVICE_UNAVAILABLE, "Queue cleared".to_string()),
            AppError::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error occurred".to_string(),
                )
            }
            AppError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: status.to_string(),
            message: error_message,
        });

        (status, body).into_response()
    }
}

/// Maps constraint violations to client errors: a duplicate key is a `Conflict`, a
/// dangling reference a `BadRequest`. Everything else stays a database error.
pub fn constraint_error(err: sqlx::Error, what: &str) -> AppError {
    let (unique, foreign_key) = match &err {
        sqlx::Error::Database(db) => (db.is_unique_violation(), db.is_foreign_key_violation()),
        _ => (false, false),
    };
    if unique {
        AppError::Conflict(format!("{} already exists", what))
    } else if foreign_key {
        AppError::BadRequest(format!("{} references an unknown record", what))
    } else {
        AppError::Database(err)
    }
}
