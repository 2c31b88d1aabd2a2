//! Discovery metadata
//!
//! - `/.well-known/oauth-authorization-server` (RFC 8414)
//! - `/.well-known/openid-configuration` (OpenID Connect Discovery 1.0)
//!
//! Both documents describe what the configured engine actually registers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use auth_core::Profile;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    pub response_types_supported: Vec<&'static str>,
    pub response_modes_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_types_supported: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

fn build(state: &AppState) -> AuthorizationServerMetadata {
    let server = &state.server;
    let base_url = state.public_url.trim_end_matches('/');
    let openid = server.profile() == Profile::OpenId;

    AuthorizationServerMetadata {
        issuer: server.issuer_name().unwrap_or(base_url).to_string(),
        authorization_endpoint: format!("{}/authorize", base_url),
        token_endpoint: format!("{}/token", base_url),
        userinfo_endpoint: openid.then(|| format!("{}/userinfo", base_url)),
        scopes_supported: server.scopes_supported().map(<[String]>::to_vec),
        response_types_supported: server.response_types_supported(),
        response_modes_supported: server.response_modes_supported(),
        grant_types_supported: server.grant_types_supported(),
        token_endpoint_auth_methods_supported: server.token_endpoint_auth_methods_supported(),
        code_challenge_methods_supported: server.code_challenge_methods_supported(),
        subject_types_supported: openid.then(|| vec!["public"]),
        id_token_signing_alg_values_supported: server.id_token_signing_alg().map(|alg| vec![alg]),
    }
}

/// Handler for `GET /.well-known/oauth-authorization-server`
pub async fn oauth_handler(State(state): State<Arc<AppState>>) -> Json<AuthorizationServerMetadata> {
    tracing::debug!("Serving authorization server metadata");
    Json(build(&state))
}

/// Handler for `GET /.well-known/openid-configuration`; 404 under the `oauth2` profile
pub async fn openid_handler(State(state): State<Arc<AppState>>) -> Response {
    if state.server.profile() != Profile::OpenId {
        return StatusCode::NOT_FOUND.into_response();
    }
    tracing::debug!("Serving OpenID provider metadata");
    Json(build(&state)).into_response()
}
