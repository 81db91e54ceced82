use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced to API callers. Rendered as `{"detail": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or missing input.
    #[error("{0}")]
    InvalidRequest(String),

    /// Input rejected by the record layer's field rules.
    #[error("{0}")]
    Validation(String),

    /// Bad, expired or revoked credential.
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Not found.")]
    NotFound,

    #[error("Internal server error.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        ApiError::Unauthorized(detail.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            tracing::error!("Internal error: {e:#}");
        }
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
