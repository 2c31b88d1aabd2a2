//! OpenID Connect hybrid flow: a code plus an ID token and/or access token
//! from the authorization endpoint.

use super::openid_implicit::{require_openid, require_openid_scope};
use super::{has_response_type, Authorization, AuthorizationEndpoint};
use crate::client_auth::AuthMethod;
use crate::code::CodeRequest;
use crate::error::OAuth2Error;
use crate::models::{Client, User};
use crate::openid::IdTokenRequest;
use crate::request::OAuth2Request;
use crate::server::{AuthorizationServer, ResponseMode};
use crate::store::Session;
use crate::token::IssueRequest;

pub struct HybridGrant;

impl AuthorizationEndpoint for HybridGrant {
    const RESPONSE_TYPES: &'static [&'static str] =
        &["code id_token", "code token", "code id_token token"];
    const GRANT_TYPE: &'static str = "authorization_code";
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
        let response_type = request.response_type().unwrap_or_default();

        let code = server.codes().issue(
            session,
            now,
            client,
            user,
            CodeRequest {
                redirect_uri: authorization.requested_redirect_uri.as_deref().unwrap_or_default(),
                scope: request.scope().unwrap_or_default(),
                nonce: request.nonce(),
                code_challenge: request.code_challenge(),
                code_challenge_method: request.code_challenge_method(),
            },
        )?;
        let mut params = vec![("code".to_string(), code.clone())];

        let mut access_token = None;
        if has_response_type(response_type, "token") {
            let token = server.issuer().issue(
                session,
                now,
                IssueRequest {
                    client,
                    grant_type: "implicit",
                    user: Some(user),
                    scope: request.scope(),
                    expires_in: None,
                    include_refresh_token: false,
                },
            )?;
            params.extend(token.params());
            access_token = Some(token.access_token);
        }

        if has_response_type(response_type, "id_token") {
            let scope = client.allowed_scope(request.scope().unwrap_or_default());
            let id_token = openid.generate_id_token(
                now,
                IdTokenRequest {
                    client,
                    user,
                    scope: &scope,
                    auth_time: now,
                    nonce: request.nonce(),
                    access_token: access_token.as_deref(),
                    code: Some(&code),
                },
            )?;
            params.push(("id_token".to_string(), id_token));
        }
        Ok(params)
    }
}
