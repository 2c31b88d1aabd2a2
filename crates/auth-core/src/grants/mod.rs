//! Grant handlers.
//!
//! Token-endpoint grants implement [`TokenEndpoint`] and run through
//! [`run_token_grant`]; authorization-endpoint grants implement
//! [`AuthorizationEndpoint`] and share [`validate_authorization`]. Dispatch is a
//! plain enum match on `grant_type` or `response_type`.

pub mod authorization_code;
pub mod client_credentials;
pub mod hybrid;
pub mod implicit;
pub mod openid_implicit;
pub mod password;
pub mod refresh_token;

use std::collections::BTreeSet;

use crate::client_auth::{authenticate_client, AuthMethod};
use crate::config::Profile;
use crate::error::OAuth2Error;
use crate::models::{Client, User};
use crate::request::OAuth2Request;
use crate::server::{AuthorizationError, AuthorizationServer, RedirectTarget, ResponseMode};
use crate::store::Session;
use crate::token::BearerToken;

use authorization_code::AuthorizationCodeGrant;
use client_credentials::ClientCredentialsGrant;
use hybrid::HybridGrant;
use implicit::ImplicitGrant;
use openid_implicit::OpenIdImplicitGrant;
use password::PasswordGrant;
use refresh_token::RefreshTokenGrant;

/// Methods accepted by grants that exchange a secret at the token endpoint.
pub const SECRET_AUTH_METHODS: &[AuthMethod] =
    &[AuthMethod::ClientSecretBasic, AuthMethod::ClientSecretPost];

/// A grant served by the token endpoint.
pub trait TokenEndpoint {
    const GRANT_TYPE: &'static str;
    const AUTH_METHODS: &'static [AuthMethod] = SECRET_AUTH_METHODS;

    /// What validation hands over to issuance.
    type Credential;

    fn validate_token_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<Self::Credential, OAuth2Error>;

    fn issue_token(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
        credential: Self::Credential,
    ) -> Result<BearerToken, OAuth2Error>;
}

/// Authenticate, validate and issue inside a single session.
pub fn run_token_grant<G: TokenEndpoint>(
    grant: &G,
    server: &AuthorizationServer,
    request: &OAuth2Request,
) -> Result<BearerToken, OAuth2Error> {
    let now = server.now();
    let mut session = server.store().begin()?;

    let client = authenticate_client(session.as_ref(), request, G::AUTH_METHODS)?;
    if !client.check_grant_type(G::GRANT_TYPE) {
        tracing::warn!("Client {} may not use grant {}", client.client_id, G::GRANT_TYPE);
        return Err(OAuth2Error::unauthorized_client());
    }

    let credential = grant.validate_token_request(server, session.as_ref(), now, request, &client)?;
    let token = grant.issue_token(server, session.as_mut(), now, request, &client, credential)?;
    session.commit()?;
    Ok(token)
}

/// A grant served by the authorization endpoint.
pub trait AuthorizationEndpoint {
    const RESPONSE_TYPES: &'static [&'static str];
    const GRANT_TYPE: &'static str;
    const RESPONSE_MODE: ResponseMode;
    /// Empty means the client is looked up by `client_id` without authentication
    const AUTH_METHODS: &'static [AuthMethod] = &[];

    /// Grant-specific checks, run after the shared ones.
    fn validate_authorization_request(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
        client: &Client,
    ) -> Result<(), OAuth2Error>;

    /// Persist whatever the grant issues and return the redirect parameters.
    fn create_authorization_response(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        authorization: &Authorization,
        user: &User,
    ) -> Result<Vec<(String, String)>, OAuth2Error>;
}

/// Outcome of the shared authorization checks.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub client: Client,
    /// The redirect URI the request carried, if any
    pub requested_redirect_uri: Option<String>,
    pub target: RedirectTarget,
}

/// Client, redirect URI and response mode failures are returned directly;
/// anything after that is delivered through the redirect.
pub fn validate_authorization<G: AuthorizationEndpoint>(
    grant: &G,
    server: &AuthorizationServer,
    session: &dyn Session,
    now: i64,
    request: &OAuth2Request,
) -> Result<Authorization, AuthorizationError> {
    let client = if G::AUTH_METHODS.is_empty() {
        let client_id = request
            .client_id()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"client_id\" in request."))?;
        session.find_client(client_id)?.ok_or_else(|| {
            tracing::warn!("Unknown client at authorization: {}", client_id);
            OAuth2Error::invalid_client()
        })?
    } else {
        authenticate_client(session, request, G::AUTH_METHODS)?
    };

    let requested_redirect_uri = request.redirect_uri().map(str::to_string);
    let redirect_uri = match requested_redirect_uri.as_deref() {
        Some(uri) if client.check_redirect_uri(uri) => uri.to_string(),
        Some(uri) => {
            tracing::warn!("Unregistered redirect URI for {}: {}", client.client_id, uri);
            return Err(OAuth2Error::invalid_request(format!(
                "Redirect URI {} is not supported by client.",
                uri
            ))
            .into());
        }
        None => client
            .default_redirect_uri()
            .map(str::to_string)
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"redirect_uri\" in request."))?,
    };

    let response_mode = match request.response_mode() {
        None => G::RESPONSE_MODE,
        Some(mode) => {
            let mode: ResponseMode = mode.parse()?;
            // Tokens never travel in the query string.
            if mode == ResponseMode::Query && G::RESPONSE_MODE == ResponseMode::Fragment {
                return Err(OAuth2Error::invalid_request(
                    "response_mode=query is not allowed for this response type",
                )
                .into());
            }
            mode
        }
    };

    let target = RedirectTarget {
        redirect_uri,
        response_mode,
        state: request.state().map(str::to_string),
    };
    let redirect = |error: OAuth2Error| AuthorizationError::redirect(error, target.clone());

    let response_type = request.response_type().unwrap_or_default();
    if !client.check_response_type(response_type) {
        tracing::warn!("Client {} may not use response_type {}", client.client_id, response_type);
        return Err(redirect(OAuth2Error::unauthorized_client()));
    }
    if !client.check_grant_type(G::GRANT_TYPE) {
        tracing::warn!("Client {} may not use grant {}", client.client_id, G::GRANT_TYPE);
        return Err(redirect(OAuth2Error::unauthorized_client()));
    }
    if !server.config().check_scopes(request.scope()) {
        return Err(redirect(OAuth2Error::InvalidScope(
            "The requested scope is invalid, unknown, or malformed.".to_string(),
        )));
    }
    grant
        .validate_authorization_request(server, session, now, request, &client)
        .map_err(redirect)?;

    Ok(Authorization {
        client,
        requested_redirect_uri,
        target,
    })
}

/// Response types compare as sets of space-separated values.
fn normalize_response_type(response_type: &str) -> BTreeSet<&str> {
    response_type.split_whitespace().collect()
}

fn matches_response_type(candidates: &[&str], response_type: &str) -> bool {
    let wanted = normalize_response_type(response_type);
    candidates
        .iter()
        .any(|candidate| normalize_response_type(candidate) == wanted)
}

fn has_response_type(response_type: &str, part: &str) -> bool {
    response_type.split_whitespace().any(|item| item == part)
}

/// Grants registered at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    Password,
}

impl TokenGrant {
    pub fn from_grant_type(server: &AuthorizationServer, grant_type: &str) -> Option<Self> {
        match grant_type {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" if server.password_verifier().is_some() => Some(Self::Password),
            _ => None,
        }
    }

    /// Grants available on `server`, in metadata order.
    pub fn registered(server: &AuthorizationServer) -> Vec<TokenGrant> {
        let mut grants = vec![Self::AuthorizationCode, Self::RefreshToken, Self::ClientCredentials];
        if server.password_verifier().is_some() {
            grants.push(Self::Password);
        }
        grants
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => <AuthorizationCodeGrant as TokenEndpoint>::GRANT_TYPE,
            Self::RefreshToken => RefreshTokenGrant::GRANT_TYPE,
            Self::ClientCredentials => ClientCredentialsGrant::GRANT_TYPE,
            Self::Password => PasswordGrant::GRANT_TYPE,
        }
    }

    pub fn run(
        &self,
        server: &AuthorizationServer,
        request: &OAuth2Request,
    ) -> Result<BearerToken, OAuth2Error> {
        match self {
            Self::AuthorizationCode => run_token_grant(&AuthorizationCodeGrant, server, request),
            Self::RefreshToken => run_token_grant(&RefreshTokenGrant, server, request),
            Self::ClientCredentials => run_token_grant(&ClientCredentialsGrant, server, request),
            Self::Password => run_token_grant(&PasswordGrant, server, request),
        }
    }
}

/// Grants registered at the authorization endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationGrant {
    Code,
    Implicit,
    OpenIdImplicit,
    Hybrid,
}

impl AuthorizationGrant {
    /// Grants available under a profile.
    pub fn registered(profile: Profile) -> &'static [AuthorizationGrant] {
        match profile {
            Profile::OAuth2 => &[Self::Code, Self::Implicit],
            Profile::OpenId => &[Self::Code, Self::OpenIdImplicit, Self::Hybrid],
        }
    }

    pub fn from_response_type(profile: Profile, response_type: &str) -> Option<Self> {
        Self::registered(profile)
            .iter()
            .copied()
            .find(|grant| matches_response_type(grant.response_types(), response_type))
    }

    pub fn response_types(&self) -> &'static [&'static str] {
        match self {
            Self::Code => AuthorizationCodeGrant::RESPONSE_TYPES,
            Self::Implicit => ImplicitGrant::RESPONSE_TYPES,
            Self::OpenIdImplicit => OpenIdImplicitGrant::RESPONSE_TYPES,
            Self::Hybrid => HybridGrant::RESPONSE_TYPES,
        }
    }

    pub fn validate(
        &self,
        server: &AuthorizationServer,
        session: &dyn Session,
        now: i64,
        request: &OAuth2Request,
    ) -> Result<Authorization, AuthorizationError> {
        match self {
            Self::Code => validate_authorization(&AuthorizationCodeGrant, server, session, now, request),
            Self::Implicit => validate_authorization(&ImplicitGrant, server, session, now, request),
            Self::OpenIdImplicit => {
                validate_authorization(&OpenIdImplicitGrant, server, session, now, request)
            }
            Self::Hybrid => validate_authorization(&HybridGrant, server, session, now, request),
        }
    }

    pub fn create_response(
        &self,
        server: &AuthorizationServer,
        session: &mut dyn Session,
        now: i64,
        request: &OAuth2Request,
        authorization: &Authorization,
        user: &User,
    ) -> Result<Vec<(String, String)>, OAuth2Error> {
        match self {
            Self::Code => AuthorizationCodeGrant
                .create_authorization_response(server, session, now, request, authorization, user),
            Self::Implicit => ImplicitGrant
                .create_authorization_response(server, session, now, request, authorization, user),
            Self::OpenIdImplicit => OpenIdImplicitGrant
                .create_authorization_response(server, session, now, request, authorization, user),
            Self::Hybrid => HybridGrant
                .create_authorization_response(server, session, now, request, authorization, user),
        }
    }
}
