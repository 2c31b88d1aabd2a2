//! Authorization endpoint
//!
//! `GET /authorize` validates the request and shows the consent page (or
//! completes immediately for `prompt=none` and `auto_approve`).
//! `POST /authorize` carries the end-user's decision and the consent token the
//! page was rendered with.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use super::{consent, end_user, html, into_http, ProtocolRequest};
use crate::AppState;

fn login_required() -> Response {
    (StatusCode::UNAUTHORIZED, Html(html::login_required_page())).into_response()
}

/// Handler for `GET /authorize`
pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    ProtocolRequest(request): ProtocolRequest,
) -> Response {
    let user = end_user(&state, &request);
    let grant = match state.server.validate_consent_request(&request, user.as_ref()) {
        Ok(grant) => grant,
        Err(e) => {
            tracing::debug!("Authorization request rejected: {}", e);
            return into_http(state.server.authorization_error_response(&e));
        }
    };

    let Some(user) = user else {
        return login_required();
    };

    let interactive = matches!(grant.prompt.as_deref(), Some("consent" | "login" | "select_account"));
    if grant.prompt.as_deref() == Some("none") || (state.config.auto_approve && !interactive) {
        tracing::info!(
            "Auto-approved authorization for client {} (user {})",
            grant.client.client_id,
            user.id
        );
        return into_http(state.server.create_authorization_response(&request, Some(&user)));
    }

    let token = state.consent.sign(user.id, &request.uri);
    Html(html::consent_page(&grant, &request.uri, &token)).into_response()
}

/// Handler for `POST /authorize`: `decision=approve` or `decision=deny`
pub async fn post_handler(
    State(state): State<Arc<AppState>>,
    ProtocolRequest(request): ProtocolRequest,
) -> Response {
    let Some(user) = end_user(&state, &request) else {
        return login_required();
    };

    let token = request.data(consent::FIELD).unwrap_or_default();
    if !state.consent.verify(user.id, &request.uri, token) {
        tracing::warn!(
            "Rejected consent decision without a valid token (user {}, client {})",
            user.id,
            request.client_id().unwrap_or("?")
        );
        return (StatusCode::FORBIDDEN, Html(html::consent_rejected_page())).into_response();
    }

    let approved = request.data("decision") == Some("approve");
    tracing::info!(
        "User {} {} authorization for client {}",
        user.id,
        if approved { "approved" } else { "denied" },
        request.client_id().unwrap_or("?")
    );
    into_http(
        state
            .server
            .create_authorization_response(&request, approved.then_some(&user)),
    )
}
