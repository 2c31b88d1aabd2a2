//! OpenID Connect implicit flow: `id_token` and `id_token token`.

use super::{has_response_type, Authorization, AuthorizationEndpoint};
use crate::client_auth::AuthMethod;
use crate::error::OAuth2Error;
use crate::models::{Client, User};
use crate::openid::{IdTokenRequest, OpenIdExtension};
use crate::request::OAuth2Request;
use crate::scope::is_openid_scope;
use crate::server::{AuthorizationServer, ResponseMode};
use crate::store::Session;
use crate::token::IssueRequest;

pub struct OpenIdImplicitGrant;

/// OpenID grants cannot run on a server built without the extension.
pub(super) fn require_openid(server: &AuthorizationServer) -> Result<&OpenIdExtension, OAuth2Error> {
    server.openid().ok_or_else(|| {
        tracing::error!("OpenID grant invoked without the OpenID extension");
        OAuth2Error::server_error()
    })
}

pub(super) fn require_openid_scope(request: &OAuth2Request) -> Result<(), OAuth2Error> {
    if is_openid_scope(request.scope()) {
        Ok(())
    } else {
        Err(OAuth2Error::InvalidScope("Missing \"openid\" scope".to_string()))
    }
}

impl AuthorizationEndpoint for OpenIdImplicitGrant {
    const RESPONSE_TYPES: &'static [&'static str] = &["id_token token", "id_token"];
    const GRANT_TYPE: &'static str = "implicit";
    const RESPONSE_MODE: ResponseMode = ResponseMode::Fragment;
    const AUTH_METHODS: &'static [AuthMethod] = &[AuthMethod::None];

    fn validate_authorization_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        _client: &Client,
    ) -> Result<(), OAuth2Error> {
        require_openid_scope(request)?;
        require_openid(server)?.validate_nonce(session, server.codes(), now, request, true)
    }

    fn create_authorization_response(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        authorization: &Authorization,
        user: &User,
    ) -> Result<Vec<(String, String)>, OAuth2Error> {
        let openid = require_openid(server)?;
        let client = &authorization.client;
        let scope = client.allowed_scope(request.scope().unwrap_or_default());
        let response_type = request.response_type().unwrap_or_default();

        let mut params = Vec::new();
        let mut access_token = None;
        if has_response_type(response_type, "token") {
            let token = server.issuer().issue(
                session,
                now,
                IssueRequest {
                    client,
                    grant_type: Self::GRANT_TYPE,
                    user: Some(user),
                    scope: request.scope(),
                    expires_in: None,
                    include_refresh_token: false,
                },
            )?;
            params.extend(token.params());
            access_token = Some(token.access_token);
        }

        let id_token = openid.generate_id_token(
            now,
            IdTokenRequest {
                client,
                user,
                scope: &scope,
                auth_time: now,
                nonce: request.nonce(),
                access_token: access_token.as_deref(),
                code: None,
            },
        )?;
        params.push(("id_token".to_string(), id_token));
        Ok(params)
    }
}
