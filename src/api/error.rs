//! API error mapping.
//!
//! Translates serving/store failures into HTTP responses. Transient
//! store trouble is a 503 so callers know to retry with backoff; budget
//! declines are 403; everything validation-shaped is 400.

use crate::serving::ServeError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Transient store failure - retryable by the caller.
    Store(anyhow::Error),
    Internal(anyhow::Error),
}

impl From<ServeError> for ApiError {
    fn from(err: ServeError) -> Self {
        match err {
            ServeError::Validation(msg) => ApiError::Validation(msg),
            ServeError::PublisherNotFound => ApiError::NotFound("Publisher not found".to_string()),
            ServeError::AdNotFound => ApiError::NotFound("Ad no longer available".to_string()),
            ServeError::NoAdAvailable => {
                ApiError::NotFound("No ad available for streaming".to_string())
            }
            ServeError::BudgetExceeded => {
                ApiError::Forbidden("Daily or total budget limit exceeded".to_string())
            }
            ServeError::Conflict => {
                ApiError::Store(anyhow::anyhow!("concurrent update conflict"))
            }
            ServeError::Store(err) => ApiError::Store(err),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Store(err) => {
                tracing::error!("Store error: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store temporarily unavailable".to_string(),
                )
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
