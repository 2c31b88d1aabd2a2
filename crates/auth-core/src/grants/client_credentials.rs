//! `grant_type=client_credentials`: the client acts on its own behalf.

use super::TokenEndpoint;
use crate::error::OAuth2Error;
use crate::models::Client;
use crate::request::OAuth2Request;
use crate::server::AuthorizationServer;
use crate::store::Session;
use crate::token::{BearerToken, IssueRequest};

pub struct ClientCredentialsGrant;

impl TokenEndpoint for ClientCredentialsGrant {
    const GRANT_TYPE: &'static str = "client_credentials";

    type Credential = ();

    fn validate_token_request(
        &self,
        server: &AuthorizationServer,
        _session: &dyn Session,
        _now: i64,
        request: &OAuth2Request,
        _client: &Client,
    ) -> Result<Self::Credential, OAuth2Error> {
        if !server.config().check_scopes(request.scope()) {
            return Err(OAuth2Error::InvalidScope(
                "The requested scope is invalid, unknown, or malformed.".to_string(),
            ));
        }
        Ok(())
    }

    fn issue_token(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
        _credential: Self::Credential,
    ) -> Result<BearerToken, OAuth2Error> {
        // No end-user, and never a refresh token.
        server.issuer().issue(
            session,
            now,
            IssueRequest {
                client,
                grant_type: Self::GRANT_TYPE,
                user: None,
                scope: request.scope(),
                expires_in: None,
                include_refresh_token: false,
            },
        )
    }
}
