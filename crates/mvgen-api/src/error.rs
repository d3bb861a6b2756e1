//! API error types.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use mvgen_models::RequestValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("{0}")]
    Validation(#[from] RequestValidationError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] mvgen_gateway::GatewayError),

    #[error("Queue error: {0}")]
    Queue(#[from] mvgen_queue::QueueError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::RateLimited => "rate_limited",
            ApiError::Validation(_) => "validation_error",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Queue(_) => "queue_unavailable",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, Vec<String>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Queue(_) | ApiError::Upstream(_) => {
                tracing::error!("{}", self);
                if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                }
            }
            ApiError::Validation(e) => format!("Invalid request: {}", e.field_names()),
            _ => self.to_string(),
        };

        let fields = match self {
            ApiError::Validation(e) => Some(e.fields),
            _ => None,
        };

        let body = ErrorResponse {
            detail,
            code,
            fields,
        };

        (status, Json(body)).into_response()
    }
}
