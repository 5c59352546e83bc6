use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use qaserve_core::GenerationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid parameter '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Generation(String),
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::InvalidParameter { field, reason } => {
                ApiError::Validation { field, reason }
            }
            GenerationError::NotReady | GenerationError::Busy => {
                ApiError::Unavailable(e.to_string())
            }
            GenerationError::Failed(_) => ApiError::Generation(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::Validation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_request_error")
            }
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            ApiError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_error"),
        };

        let body = json!({
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16()
            }
        });

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
