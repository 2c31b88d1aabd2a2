//! `grant_type=refresh_token`: exchange a refresh token for a new access token,
//! revoking the old one in the same session.

use super::TokenEndpoint;
use crate::error::OAuth2Error;
use crate::models::{Client, Token, User};
use crate::request::OAuth2Request;
use crate::scope::is_subset;
use crate::server::AuthorizationServer;
use crate::store::Session;
use crate::token::{BearerToken, IssueRequest};

const INVALID_REFRESH_TOKEN: &str = "Invalid \"refresh_token\" in request.";

pub struct RefreshTokenGrant;

impl TokenEndpoint for RefreshTokenGrant {
    const GRANT_TYPE: &'static str = "refresh_token";

    type Credential = (Token, Option<User>);

    fn validate_token_request(
        &self,
        _server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<Self::Credential, OAuth2Error> {
        let refresh_token = request
            .refresh_token()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"refresh_token\" in request."))?;

        let token = match session.find_token_by_refresh(refresh_token)? {
            Some(token) if token.check_client(client) && !token.is_revoked() && !token.is_expired(now) => {
                token
            }
            _ => {
                tracing::warn!("Rejected refresh token for client {}", client.client_id);
                return Err(OAuth2Error::invalid_grant(INVALID_REFRESH_TOKEN));
            }
        };

        if let Some(scope) = request.scope()
            && !is_subset(scope, &token.scope)
        {
            return Err(OAuth2Error::InvalidScope(
                "The requested scope exceeds the scope originally granted.".to_string(),
            ));
        }

        let user = match token.user_id {
            Some(user_id) => Some(session.find_user(user_id)?.ok_or_else(|| {
                OAuth2Error::invalid_request("There is no \"user\" for this token.")
            })?),
            None => None,
        };
        Ok((token, user))
    }

    fn issue_token(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
        (old, user): Self::Credential,
    ) -> Result<BearerToken, OAuth2Error> {
        if !session.revoke_token(&old.access_token)? {
            return Err(OAuth2Error::invalid_grant(INVALID_REFRESH_TOKEN));
        }

        let scope = request.scope().unwrap_or(&old.scope);
        let token = server.issuer().issue(
            session,
            now,
            IssueRequest {
                client,
                grant_type: Self::GRANT_TYPE,
                user: user.as_ref(),
                scope: Some(scope),
                expires_in: Some(old.expires_in),
                include_refresh_token: server.config().include_new_refresh_token,
            },
        )?;
        tracing::info!("Rotated token for client {}", client.client_id);
        Ok(token)
    }
}
