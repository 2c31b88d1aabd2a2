//! OAuth 2.0 / OpenID Connect HTTP endpoints
//!
//! Handlers translate between axum and the transport-neutral request and
//! response types of `auth-core`:
//! - `/authorize` (consent page and decision)
//! - `/token`
//! - RFC 8414 and OpenID discovery metadata

pub mod authorize;
pub mod consent;
pub mod html;
pub mod metadata;
pub mod token;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use auth_core::{OAuth2Error, OAuth2Request, OAuth2Response, User};

use crate::AppState;

/// An inbound request in the engine's shape.
pub struct ProtocolRequest(pub OAuth2Request);

impl<S> FromRequest<S> for ProtocolRequest
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let uri = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        let mut request = OAuth2Request::new(parts.method.as_str(), uri);
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                request = request.with_header(name.as_str(), value);
            }
        }

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let bytes = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(IntoResponse::into_response)?;

        if bytes.is_empty() {
            return Ok(Self(request));
        }
        if content_type.starts_with("application/x-www-form-urlencoded") {
            request = request.with_form_body(&bytes);
        } else if content_type.starts_with("application/json") {
            let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
                tracing::debug!("Rejected malformed JSON body: {}", e);
                into_http(OAuth2Response::error(
                    &OAuth2Error::invalid_request("Malformed JSON body."),
                    None,
                ))
            })?;
            request = request.with_json(&body);
        }
        Ok(Self(request))
    }
}

/// Turn an engine response into an HTTP response.
pub fn into_http(response: OAuth2Response) -> Response {
    match response {
        OAuth2Response::Json {
            status,
            headers,
            body,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (status, Json(body)).into_response();
            for (name, value) in headers {
                match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
                    (Ok(name), Ok(value)) => {
                        response.headers_mut().insert(name, value);
                    }
                    _ => tracing::warn!("Dropped an unrepresentable response header"),
                }
            }
            response
        }
        OAuth2Response::Redirect { location } => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
    }
}

/// The end-user the fronting proxy authenticated, if any.
pub fn end_user(state: &AppState, request: &OAuth2Request) -> Option<User> {
    let raw = request.header(&state.config.user_header)?;
    let Ok(user_id) = raw.trim().parse::<i64>() else {
        tracing::warn!("Ignoring non-numeric {} header", state.config.user_header);
        return None;
    };
    match state.server.find_user(user_id) {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            tracing::warn!("Authenticated user {} is not in the store", user_id);
            None
        }
        Err(e) => {
            tracing::error!("User lookup failed: {}", e);
            None
        }
    }
}
