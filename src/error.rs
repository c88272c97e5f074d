// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Domain errors raised by the monitor, the scoring engine and the coordinator.
#[derive(Debug, Error)]
pub enum ExamError {
    /// Store or network failure. Retry-safe; the session stays active.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// Malformed or mismatched configuration, e.g. a bad weight vector.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The platform exposes no integrity primitive at all.
    #[error("integrity cannot be enforced: the platform exposes no integrity primitive")]
    Unenforceable,

    #[error("exam session {0} not found")]
    SessionNotFound(i64),

    #[error("user {0} is not eligible to take the exam")]
    NotEligible(i64),

    #[error("a submission for session {0} is already in flight")]
    SubmissionInFlight(i64),

    #[error("exam session {0} is already finalized")]
    AlreadyFinalized(i64),

    #[error("submit unlocks in {remaining_seconds}s")]
    SubmitLocked { remaining_seconds: u64 },
}

pub type ExamResult<T> = Result<T, ExamError>;

impl From<sqlx::Error> for ExamError {
    fn from(err: sqlx::Error) -> Self {
        ExamError::TransientIo(err.to_string())
    }
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable (retryable)
    Unavailable(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., a submission already in flight)
    Conflict(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::error!("Service Unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Failed to process exam results. Please retry.".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };
        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Maps domain errors onto HTTP semantics.
/// Allows using `?` on coordinator calls inside handlers.
impl From<ExamError> for AppError {
    fn from(err: ExamError) -> Self {
        let msg = err.to_string();
        match err {
            ExamError::TransientIo(_) => AppError::Unavailable(msg),
            ExamError::Configuration(_) => AppError::InternalServerError(msg),
            ExamError::Unenforceable | ExamError::SubmitLocked { .. } => AppError::BadRequest(msg),
            ExamError::SessionNotFound(_) => AppError::NotFound(msg),
            ExamError::NotEligible(_) => AppError::Forbidden(msg),
            ExamError::SubmissionInFlight(_) | ExamError::AlreadyFinalized(_) => {
                AppError::Conflict(msg)
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
