//! Inbound authentication and route tagging.
//!
//! Pooled routes are guarded by the configured API key. Mirror routes carry
//! an upstream session in their bearer instead, so they are tagged with
//! [`RouteMode::Mirror`] and skip the key check.

use std::sync::Arc;

use axum::Json;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::models::ErrorResponse;

/// How the chat handler should serve a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RouteMode {
    /// Served from the session pool with failover.
    #[default]
    Pooled,
    /// Served with the caller's own session, single attempt.
    Mirror,
}

/// Bearer token from an `Authorization` header value.
pub fn bearer_token(value: &str) -> Option<&str> {
    value
        .trim()
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Reject requests whose bearer token is not `expected`.
pub async fn require_api_key(expected: Arc<str>, req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match token {
        Some(token) if token == expected.as_ref() => next.run(req).await,
        _ => {
            tracing::warn!(
                path = %req.uri().path(),
                "Unauthorized request - missing or invalid API key"
            );
            let mut res = (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new(
                    "Invalid API key",
                    "authentication_error",
                )),
            )
                .into_response();
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            res
        }
    }
}
