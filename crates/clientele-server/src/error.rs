use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use clientele_core::{StoreError, ValidationError};

/// Errors surfaced by handlers. Internal detail is logged, never returned.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unauthorized,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(d) => (StatusCode::BAD_REQUEST, d),
            ApiError::NotFound(d) => (StatusCode::NOT_FOUND, d),
            ApiError::Conflict(d) => (StatusCode::CONFLICT, d),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Invalid or missing token".to_string()),
            ApiError::Internal(cause) => {
                tracing::error!(%cause, "request failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "message": "An unexpected error occurred"
                    })),
                )
                    .into_response();
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let detail = e.to_string();
        match e {
            StoreError::NotFound => ApiError::NotFound(detail),
            StoreError::DuplicateDocument(_) | StoreError::DuplicateEmail(_) => ApiError::Conflict(detail),
            StoreError::Backend(_) => ApiError::Internal(detail),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}
