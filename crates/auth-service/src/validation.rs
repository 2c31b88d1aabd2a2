//! Token validation endpoint for forward-auth proxies
//!
//! The proxy calls `GET /validate` with the original request's headers and
//! forwards the request only on 200. On success the token's client and user
//! are echoed back in `x-auth-client-id` / `x-auth-user-id` for the proxy to copy.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::AppState;

/// The token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn unauthorized(challenge: &'static str, message: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        message,
    )
        .into_response()
}

/// Handler for `GET /validate`
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        tracing::debug!("No bearer token presented");
        return unauthorized("Bearer", "Missing bearer token");
    };

    match state.server.validate_bearer(token) {
        Ok(token) => {
            tracing::debug!("Request authenticated via token for client {}", token.client_id);
            let user_id = token.user_id.map(|id| id.to_string()).unwrap_or_default();
            (
                StatusCode::OK,
                [("x-auth-client-id", token.client_id), ("x-auth-user-id", user_id)],
                "OK",
            )
                .into_response()
        }
        Err(e) => {
            tracing::debug!("Bearer token rejected: {}", e);
            unauthorized("Bearer error=\"invalid_token\"", "Invalid or expired token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc "));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic b3BzOm9wcw=="));
        assert_eq!(bearer_token(&headers), None);
    }
}
