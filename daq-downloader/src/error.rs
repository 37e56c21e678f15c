//! Error types for the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::service::ServiceError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unknown season or run key (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed parameters (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Scan already in progress (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Time-series store failed or refused the query (502)
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::UnknownDataset(_) | ServiceError::RunNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            ServiceError::InvalidQuery(msg) => ApiError::BadRequest(msg),
            ServiceError::Busy(e) => ApiError::Conflict(e.to_string()),
            ServiceError::Store(e) => ApiError::Store(e.to_string()),
            ServiceError::Registry(daq_common::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            ServiceError::Registry(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Store(msg) => (StatusCode::BAD_GATEWAY, "STORE_ERROR", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, message = %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
