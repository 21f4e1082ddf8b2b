use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::error::EngineError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

/// Engine errors are all operational; map each taxonomy variant onto its
/// HTTP shape. Infrastructure faults stay opaque to the client.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidState(message) => ApiError::Conflict(message),
            EngineError::Forbidden(message) => ApiError::Forbidden(message),
            EngineError::NotFound(message) => ApiError::NotFound(message),
            EngineError::ScoringUnavailable(message) => {
                ApiError::ServiceUnavailable(format!("Scoring is unavailable, try again: {message}"))
            }
            EngineError::ValidationFailed(message) => ApiError::BadRequest(message),
            EngineError::Database(err) => ApiError::internal(err, "Database operation failed"),
            EngineError::Internal(err) => ApiError::internal(err, "Internal consistency error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message.to_string()),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::ServiceUnavailable(message) => {
                tracing::warn!(error = %message, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
    }
}
