//! Bearer token authentication middleware

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

/// Reject requests whose `Authorization` header does not carry the
/// configured bearer token.
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(&request)?;

    if token != expected_token {
        debug!("rejected request to {} with invalid token", request.uri());
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

fn bearer_token(request: &Request<Body>) -> Result<&str, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidFormat)
}

/// Authentication errors
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
