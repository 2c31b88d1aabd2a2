//! `response_type=code` at the authorization endpoint and
//! `grant_type=authorization_code` at the token endpoint.

use super::{Authorization, AuthorizationEndpoint, TokenEndpoint};
use crate::code::CodeRequest;
use crate::error::OAuth2Error;
use crate::models::{AuthorizationCode, Client, User};
use crate::openid::IdTokenRequest;
use crate::request::OAuth2Request;
use crate::scope::is_openid_scope;
use crate::server::{AuthorizationServer, ResponseMode};
use crate::store::Session;
use crate::token::{BearerToken, IssueRequest};

pub struct AuthorizationCodeGrant;

impl AuthorizationEndpoint for AuthorizationCodeGrant {
    const RESPONSE_TYPES: &'static [&'static str] = &["code"];
    const GRANT_TYPE: &'static str = "authorization_code";
    const RESPONSE_MODE: ResponseMode = ResponseMode::Query;

    fn validate_authorization_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<(), OAuth2Error> {
        server.pkce().validate_authorization_request(client, request)?;
        if let Some(openid) = server.openid()
            && is_openid_scope(request.scope())
        {
            openid.validate_nonce(session, server.codes(), now, request, true)?;
        }
        Ok(())
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
        let code = server.codes().issue(
            session,
            now,
            &authorization.client,
            user,
            CodeRequest {
                redirect_uri: authorization.requested_redirect_uri.as_deref().unwrap_or_default(),
                scope: request.scope().unwrap_or_default(),
                nonce: request.nonce(),
                code_challenge: request.code_challenge(),
                code_challenge_method: request.code_challenge_method(),
            },
        )?;
        Ok(vec![("code".to_string(), code)])
    }
}

impl TokenEndpoint for AuthorizationCodeGrant {
    const GRANT_TYPE: &'static str = "authorization_code";

    type Credential = (AuthorizationCode, User);

    fn validate_token_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<Self::Credential, OAuth2Error> {
        let code = request
            .code()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"code\" in request."))?;
        let authorization_code = server.codes().redeem(session, now, code, client)?;

        // A code issued without a redirect URI may be redeemed without one.
        if !authorization_code.redirect_uri.is_empty()
            && request.redirect_uri() != Some(authorization_code.redirect_uri.as_str())
        {
            tracing::warn!("Redirect URI mismatch for client {}", client.client_id);
            return Err(OAuth2Error::invalid_grant("Invalid \"redirect_uri\" in request."));
        }

        server.pkce().verify_code_verifier(&authorization_code, request)?;

        let user = session.find_user(authorization_code.user_id)?.ok_or_else(|| {
            tracing::warn!("Code for client {} refers to a missing user", client.client_id);
            OAuth2Error::invalid_request("There is no \"user\" for this code.")
        })?;
        Ok((authorization_code, user))
    }

    fn issue_token(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        _request: &OAuth2Request,
        client: &Client,
        (authorization_code, user): Self::Credential,
    ) -> Result<BearerToken, OAuth2Error> {
        server.codes().consume(session, &authorization_code)?;

        let mut token = server.issuer().issue(
            session,
            now,
            IssueRequest {
                client,
                grant_type: <Self as TokenEndpoint>::GRANT_TYPE,
                user: Some(&user),
                scope: Some(authorization_code.scope.as_str()),
                expires_in: None,
                include_refresh_token: client.check_grant_type("refresh_token"),
            },
        )?;

        if let Some(openid) = server.openid()
            && is_openid_scope(Some(authorization_code.scope.as_str()))
        {
            token.id_token = Some(openid.generate_id_token(
                now,
                IdTokenRequest {
                    client,
                    user: &user,
                    scope: &authorization_code.scope,
                    auth_time: authorization_code.auth_time,
                    nonce: authorization_code.nonce.as_deref(),
                    access_token: Some(&token.access_token),
                    code: None,
                },
            )?);
        }
        Ok(token)
    }
}
