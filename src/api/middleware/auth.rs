//! API key authentication middleware
//!
//! Checks the `X-API-Key` header against the configured key. Only active
//! when a key is configured.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Authentication middleware
pub async fn auth_middleware(
    State(expected_key): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("API request without API key");
            AuthError::MissingKey
        })?;

    if api_key != expected_key {
        warn!("invalid API key attempt (key length {})", api_key.len());
        return Err(AuthError::InvalidKey);
    }

    Ok(next.run(request).await)
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingKey,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingKey => (
                StatusCode::UNAUTHORIZED,
                "Missing API key. Include the 'X-API-Key' header in your request.",
            ),
            AuthError::InvalidKey => (StatusCode::UNAUTHORIZED, "Invalid API key"),
        };

        (status, message).into_response()
    }
}
