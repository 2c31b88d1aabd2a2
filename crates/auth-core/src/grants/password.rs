//! Resource owner password credentials grant.
//!
//! Registered only when the deployment supplies a [`PasswordVerifier`]; the
//! engine itself never stores or checks passwords.

use super::TokenEndpoint;
use crate::error::OAuth2Error;
use crate::models::{Client, User};
use crate::request::OAuth2Request;
use crate::server::AuthorizationServer;
use crate::store::Session;
use crate::token::{BearerToken, IssueRequest};

/// Deployment hook that checks a username/password pair.
pub trait PasswordVerifier: Send + Sync {
    /// Return the user the credentials belong to, or `None` if they are wrong.
    fn authenticate_user(
        &self,
        session: &dyn Session,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, OAuth2Error>;
}

pub struct PasswordGrant;

impl TokenEndpoint for PasswordGrant {
    const GRANT_TYPE: &'static str = "password";

    type Credential = User;

    fn validate_token_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        _now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<Self::Credential, OAuth2Error> {
        let verifier = server.password_verifier().ok_or_else(|| {
            OAuth2Error::UnsupportedGrantType("grant_type=password is not supported".to_string())
        })?;
        let username = request
            .username()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"username\" in request."))?;
        let password = request
            .password()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"password\" in request."))?;

        if !server.config().check_scopes(request.scope()) {
            return Err(OAuth2Error::InvalidScope(
                "The requested scope is invalid, unknown, or malformed.".to_string(),
            ));
        }

        verifier
            .authenticate_user(session, username, password)?
            .ok_or_else(|| {
                tracing::warn!("Password authentication failed via client {}", client.client_id);
                OAuth2Error::invalid_request("Invalid \"username\" or \"password\" in request.")
            })
    }

    fn issue_token(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
        user: Self::Credential,
    ) -> Result<BearerToken, OAuth2Error> {
        server.issuer().issue(
            session,
            now,
            IssueRequest {
                client,
                grant_type: Self::GRANT_TYPE,
                user: Some(&user),
                scope: request.scope(),
                expires_in: None,
                include_refresh_token: client.check_grant_type("refresh_token"),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, basic_auth};

    /// Accepts `admin` / `hunter2`.
    struct FixedPassword;

    impl PasswordVerifier for FixedPassword {
        fn authenticate_user(
            &self,
            session: &dyn Session,
            username: &str,
            password: &str,
        ) -> Result<Option<User>, OAuth2Error> {
            if username == "admin" && password == "hunter2" {
                Ok(session.find_user(1)?)
            } else {
                Ok(None)
            }
        }
    }

    fn password_request(username: &str, password: &str) -> OAuth2Request {
        OAuth2Request::new("POST", "/token")
            .with_header("Authorization", basic_auth("ops", "ops"))
            .with_form([
                ("grant_type", "password"),
                ("username", username),
                ("password", password),
            ])
    }

    #[test]
    fn test_unsupported_without_verifier() {
        let (server, _clock) = testing::server();
        let err = server.issue_token(&password_request("admin", "hunter2")).unwrap_err();
        assert_eq!(err.error_code(), "unsupported_grant_type");
    }

    #[test]
    fn test_password_grant_with_verifier() {
        let (server, _clock) = testing::server_from(testing::builder().password_verifier(FixedPassword));
        let token = server.issue_token(&password_request("admin", "hunter2")).unwrap();
        assert_eq!(token.expires_in, 864000);
        assert!(token.refresh_token.is_some());

        let err = server.issue_token(&password_request("admin", "wrong")).unwrap_err();
        assert_eq!(err.error_code(), "invalid_request");
    }
}
