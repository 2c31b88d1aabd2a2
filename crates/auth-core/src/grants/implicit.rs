//! OAuth 2.0 implicit grant: `response_type=token`.

use super::{Authorization, AuthorizationEndpoint};
use crate::client_auth::AuthMethod;
use crate::error::OAuth2Error;
use crate::models::{Client, User};
use crate::request::OAuth2Request;
use crate::server::{AuthorizationServer, ResponseMode};
use crate::store::Session;
use crate::token::IssueRequest;

pub struct ImplicitGrant;

impl AuthorizationEndpoint for ImplicitGrant {
    const RESPONSE_TYPES: &'static [&'static str] = &["token"];
    const GRANT_TYPE: &'static str = "implicit";
    const RESPONSE_MODE: ResponseMode = ResponseMode::Fragment;
    const AUTH_METHODS: &'static [AuthMethod] = &[AuthMethod::None];

    fn validate_authorization_request(
        &self,
        _server: &AuthorizationServer,
        _session: &dyn Session,
        _now: i64,
        _request: &OAuth2Request,
        _client: &Client,
    ) -> Result<(), OAuth2Error> {
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
        // Implicit responses never carry a refresh token.
        let token = server.issuer().issue(
            session,
            now,
            IssueRequest {
                client: &authorization.client,
                grant_type: Self::GRANT_TYPE,
                user: Some(user),
                scope: request.scope(),
                expires_in: None,
                include_refresh_token: false,
            },
        )?;
        Ok(token.params())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::server::OAuth2Response;
    use crate::testing;

    #[test]
    fn test_token_delivered_in_fragment() {
        let (server, _clock) = testing::server_with_profile(Profile::OAuth2);
        let request = OAuth2Request::new(
            "GET",
            "/authorize?response_type=token&client_id=ops&scope=profile&state=s1",
        );
        let response = server.create_authorization_response(&request, Some(&testing::user()));
        let location = testing::redirect_location(&response);

        assert!(location.starts_with("https://example.com/#"));
        assert_eq!(testing::redirect_param(&location, "expires_in").as_deref(), Some("3600"));
        assert_eq!(testing::redirect_param(&location, "state").as_deref(), Some("s1"));
        assert!(testing::redirect_param(&location, "access_token").is_some());
        assert!(testing::redirect_param(&location, "refresh_token").is_none());
    }

    #[test]
    fn test_client_without_implicit_grant_gets_redirected_error() {
        let (server, _clock) = testing::server_with_profile(Profile::OAuth2);
        let request = OAuth2Request::new(
            "GET",
            format!("/authorize?response_type=token&client_id={}", testing::SECOND_CLIENT),
        );
        let response = server.create_authorization_response(&request, Some(&testing::user()));
        let OAuth2Response::Redirect { location } = response else {
            panic!("expected redirect");
        };
        assert_eq!(
            testing::redirect_param(&location, "error").as_deref(),
            Some("unauthorized_client")
        );
    }

    #[test]
    fn test_query_response_mode_rejected() {
        let (server, _clock) = testing::server_with_profile(Profile::OAuth2);
        let request = OAuth2Request::new(
            "GET",
            "/authorize?response_type=token&client_id=ops&response_mode=query",
        );
        let err = server.validate_consent_request(&request, None).unwrap_err();
        assert!(err.redirect.is_none());
        assert_eq!(err.error.error_code(), "invalid_request");
    }
}
