//! OpenID Connect UserInfo endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use auth_core::{OAuth2Error, OAuth2Response};

use crate::oauth::into_http;
use crate::validation::bearer_token;
use crate::AppState;

/// Handler for `GET /userinfo`
pub async fn handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let result = bearer_token(&headers)
        .ok_or_else(OAuth2Error::invalid_token)
        .and_then(|token| state.server.user_info(token));

    match result {
        Ok(claims) => Json(claims).into_response(),
        Err(e) => {
            tracing::debug!("UserInfo request rejected: {}", e);
            into_http(OAuth2Response::error(&e, None))
        }
    }
}
