//! HTTP error type and the mapping from orchestration failures.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use convoy_core::ChatError;
use thiserror::Error;

use crate::models::ErrorResponse;

/// Message returned when the pool could not serve a request.
pub const POOL_FAILURE_MESSAGE: &str = "Failed to process request after multiple attempts";

/// Message returned when a mirror attempt failed upstream.
pub const MIRROR_FAILURE_MESSAGE: &str = "Failed to process request";

#[derive(Debug, Error)]
pub enum HttpError {
    /// Bad request (invalid input).
    #[error("{0}")]
    BadRequest(String),

    /// Caller is not allowed to use this endpoint.
    #[error("{0}")]
    Forbidden(String),

    /// Internal server error; the message carries no upstream detail.
    #[error("{0}")]
    Internal(String),
}

impl HttpError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    const fn error_type(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "invalid_request_error",
            Self::Forbidden(_) => "permission_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse::new(self.to_string(), self.error_type());
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for HttpError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::MirrorDisabled => Self::Forbidden(err.to_string()),
            ChatError::InvalidAuthorization(_) => Self::BadRequest(err.to_string()),
            ChatError::NoSessions | ChatError::RetryExhausted { .. } => {
                Self::Internal(POOL_FAILURE_MESSAGE.to_string())
            }
            ChatError::Attempt(_) => Self::Internal(MIRROR_FAILURE_MESSAGE.to_string()),
        }
    }
}
