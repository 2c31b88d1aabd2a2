//! Token endpoint
//!
//! Every grant (authorization_code, refresh_token, client_credentials, and
//! password when enabled) is dispatched by the engine on `grant_type`.

use std::sync::Arc;

use axum::{extract::State, response::Response};

use super::{into_http, ProtocolRequest};
use crate::AppState;

/// Handler for `POST /token`
pub async fn handler(
    State(state): State<Arc<AppState>>,
    ProtocolRequest(request): ProtocolRequest,
) -> Response {
    tracing::debug!(
        "Token request: grant_type={}",
        request.grant_type().unwrap_or("<missing>")
    );
    into_http(state.server.create_token_response(&request))
}
