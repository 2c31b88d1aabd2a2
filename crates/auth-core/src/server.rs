//! The authorization server: grant dispatch plus the response shapes the
//! transport layer turns into HTTP.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::clock::{Clock, SystemClock};
use crate::code::CodeEngine;
use crate::config::{Profile, ServerConfig};
use crate::error::{ConfigError, OAuth2Error, StoreError};
use crate::grants::password::PasswordVerifier;
use crate::grants::{AuthorizationGrant, TokenGrant, SECRET_AUTH_METHODS};
use crate::models::{Client, Token, User};
use crate::openid::{DefaultUserInfo, IdTokenSigner, JwtSigner, OpenIdExtension, UserInfoProvider};
use crate::pkce::{ChallengeMethod, CodeChallenge};
use crate::request::OAuth2Request;
use crate::scope::is_openid_scope;
use crate::store::{read_only, Store};
use crate::token::{
    BearerToken, ExpiresIn, GeneratorRegistry, TokenContext, TokenIssuer,
    DEFAULT_ACCESS_TOKEN_LENGTH, DEFAULT_REFRESH_TOKEN_LENGTH,
};

/// Where an authorization response parameter set is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Query,
    Fragment,
}

impl ResponseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Query => "query",
            ResponseMode::Fragment => "fragment",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(ResponseMode::Query),
            "fragment" => Ok(ResponseMode::Fragment),
            other => Err(OAuth2Error::invalid_request(format!(
                "Unsupported response_mode: {}",
                other
            ))),
        }
    }
}

/// A validated redirect URI together with how to use it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub redirect_uri: String,
    pub response_mode: ResponseMode,
    pub state: Option<String>,
}

impl RedirectTarget {
    /// Build the redirect location, appending `state` when the request carried one.
    pub fn location(&self, mut params: Vec<(String, String)>) -> String {
        if let Some(state) = &self.state {
            params.push(("state".to_string(), state.clone()));
        }
        append_params(&self.redirect_uri, self.response_mode, &params)
    }
}

fn append_params(redirect_uri: &str, mode: ResponseMode, params: &[(String, String)]) -> String {
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            match mode {
                ResponseMode::Query => {
                    url.query_pairs_mut().extend_pairs(params);
                }
                ResponseMode::Fragment => url.set_fragment(Some(&encoded)),
            }
            url.to_string()
        }
        Err(e) => {
            tracing::warn!("Redirect URI {} does not parse ({}), appending raw", redirect_uri, e);
            let separator = match mode {
                ResponseMode::Query if redirect_uri.contains('?') => '&',
                ResponseMode::Query => '?',
                ResponseMode::Fragment => '#',
            };
            format!("{}{}{}", redirect_uri, separator, encoded)
        }
    }
}

/// An authorization endpoint failure, with the redirect to deliver it through
/// once the client and redirect URI are known to be trustworthy.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct AuthorizationError {
    pub error: OAuth2Error,
    pub redirect: Option<RedirectTarget>,
}

impl AuthorizationError {
    pub fn redirect(error: OAuth2Error, target: RedirectTarget) -> Self {
        Self {
            error,
            redirect: Some(target),
        }
    }
}

impl From<OAuth2Error> for AuthorizationError {
    fn from(error: OAuth2Error) -> Self {
        Self {
            error,
            redirect: None,
        }
    }
}

impl From<StoreError> for AuthorizationError {
    fn from(e: StoreError) -> Self {
        OAuth2Error::from(e).into()
    }
}

/// A transport-neutral response.
#[derive(Debug, Clone, PartialEq)]
pub enum OAuth2Response {
    Json {
        status: u16,
        headers: Vec<(String, String)>,
        body: Value,
    },
    Redirect {
        location: String,
    },
}

impl OAuth2Response {
    fn no_store(status: u16, body: Value) -> Self {
        OAuth2Response::Json {
            status,
            headers: vec![
                ("Cache-Control".to_string(), "no-store".to_string()),
                ("Pragma".to_string(), "no-cache".to_string()),
            ],
            body,
        }
    }

    /// JSON error body with the status and challenge header for `error`.
    pub fn error(error: &OAuth2Error, state: Option<&str>) -> Self {
        let body = serde_json::to_value(error.body(state)).unwrap_or(Value::Null);
        let mut response = Self::no_store(error.status_code(), body);
        let challenge = match error {
            OAuth2Error::InvalidClient(_) => Some("Basic".to_string()),
            OAuth2Error::InvalidToken(_) | OAuth2Error::InsufficientScope(_) => {
                Some(format!("Bearer error=\"{}\"", error.error_code()))
            }
            _ => None,
        };
        if let (Some(challenge), OAuth2Response::Json { headers, .. }) = (challenge, &mut response) {
            headers.push(("WWW-Authenticate".to_string(), challenge));
        }
        response
    }
}

/// A pending authorization, validated and ready for the end-user's decision.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    pub client: Client,
    pub response_type: String,
    pub redirect_uri: String,
    pub response_mode: ResponseMode,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    /// Resolved OpenID `prompt`: `login`, `consent`, `select_account` or `none`
    pub prompt: Option<String>,
    pub user: Option<User>,
}

impl ConsentGrant {
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// OpenID `prompt` handling for an authorization request.
fn resolve_prompt(request: &OAuth2Request, end_user: Option<&User>) -> Result<Option<String>, OAuth2Error> {
    let Some(prompt) = request.prompt() else {
        return Ok(end_user.is_none().then(|| "login".to_string()));
    };
    let prompts: Vec<&str> = prompt.split_whitespace().collect();
    if prompts.contains(&"none") {
        if prompts.len() > 1 {
            return Err(OAuth2Error::invalid_request("Invalid \"prompt\" parameter"));
        }
        if end_user.is_none() {
            return Err(OAuth2Error::LoginRequired(
                "The end-user is not authenticated.".to_string(),
            ));
        }
        return Ok(Some("none".to_string()));
    }
    if end_user.is_none() || prompts.contains(&"login") {
        return Ok(Some("login".to_string()));
    }
    Ok(["consent", "select_account"]
        .into_iter()
        .find(|p| prompts.contains(p))
        .map(str::to_string))
}

pub struct AuthorizationServer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: ServerConfig,
    issuer: TokenIssuer,
    codes: CodeEngine,
    pkce: CodeChallenge,
    openid: Option<OpenIdExtension>,
    user_info: Arc<dyn UserInfoProvider>,
    password: Option<Arc<dyn PasswordVerifier>>,
}

impl fmt::Debug for AuthorizationServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationServer")
            .field("profile", &self.config.profile)
            .field("issuer", &self.issuer)
            .field("codes", &self.codes)
            .field("password_grant", &self.password.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthorizationServer {
    pub fn builder(config: ServerConfig, store: impl Store + 'static) -> AuthorizationServerBuilder {
        AuthorizationServerBuilder {
            config,
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            generators: GeneratorRegistry::default(),
            signer: None,
            user_info: Arc::new(DefaultUserInfo),
            password: None,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn profile(&self) -> Profile {
        self.config.profile
    }

    pub(crate) fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub(crate) fn codes(&self) -> &CodeEngine {
        &self.codes
    }

    pub(crate) fn pkce(&self) -> &CodeChallenge {
        &self.pkce
    }

    pub(crate) fn openid(&self) -> Option<&OpenIdExtension> {
        self.openid.as_ref()
    }

    pub(crate) fn password_verifier(&self) -> Option<&dyn PasswordVerifier> {
        self.password.as_deref()
    }

    // --- Token endpoint ---

    /// Handle a token endpoint request end to end.
    pub fn create_token_response(&self, request: &OAuth2Request) -> OAuth2Response {
        let result = self.issue_token(request).and_then(|token| {
            serde_json::to_value(&token).map_err(|e| {
                tracing::error!("Failed to serialize token response: {}", e);
                OAuth2Error::server_error()
            })
        });
        match result {
            Ok(body) => OAuth2Response::no_store(200, body),
            Err(e) => {
                tracing::debug!("Token request failed: {}", e);
                OAuth2Response::error(&e, None)
            }
        }
    }

    pub fn issue_token(&self, request: &OAuth2Request) -> Result<BearerToken, OAuth2Error> {
        if request.method != "POST" {
            return Err(OAuth2Error::invalid_request("Token requests must use POST."));
        }
        let grant_type = request
            .grant_type()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"grant_type\" in request."))?;
        let grant = TokenGrant::from_grant_type(self, grant_type).ok_or_else(|| {
            OAuth2Error::UnsupportedGrantType(format!("grant_type={} is not supported", grant_type))
        })?;
        grant.run(self, request)
    }

    // --- Authorization endpoint ---

    fn authorization_grant(&self, request: &OAuth2Request) -> Result<AuthorizationGrant, OAuth2Error> {
        let response_type = request
            .response_type()
            .ok_or_else(|| OAuth2Error::invalid_request("Missing \"response_type\" in request."))?;
        AuthorizationGrant::from_response_type(self.config.profile, response_type).ok_or_else(|| {
            OAuth2Error::UnsupportedResponseType(format!(
                "response_type={} is not supported",
                response_type
            ))
        })
    }

    /// Validate an authorization request before asking the end-user to approve it.
    pub fn validate_consent_request(
        &self,
        request: &OAuth2Request,
        end_user: Option<&User>,
    ) -> Result<ConsentGrant, AuthorizationError> {
        let now = self.now();
        let grant = self.authorization_grant(request)?;
        let authorization = read_only(self.store(), |session| {
            grant.validate(self, session, now, request)
        })?;

        let prompt = if self.openid.is_some() {
            resolve_prompt(request, end_user)
                .map_err(|e| AuthorizationError::redirect(e, authorization.target.clone()))?
        } else {
            None
        };

        Ok(ConsentGrant {
            client: authorization.client,
            response_type: request.response_type().unwrap_or_default().to_string(),
            redirect_uri: authorization.target.redirect_uri,
            response_mode: authorization.target.response_mode,
            scope: request.scope().map(str::to_string),
            state: authorization.target.state,
            nonce: request.nonce().map(str::to_string),
            prompt,
            user: end_user.cloned(),
        })
    }

    /// Complete an authorization request. `grant_user` is `None` when the
    /// end-user declined.
    pub fn create_authorization_response(
        &self,
        request: &OAuth2Request,
        grant_user: Option<&User>,
    ) -> OAuth2Response {
        match self.authorize(request, grant_user) {
            Ok(location) => OAuth2Response::Redirect { location },
            Err(e) => self.authorization_error_response(&e),
        }
    }

    fn authorize(&self, request: &OAuth2Request, grant_user: Option<&User>) -> Result<String, AuthorizationError> {
        let now = self.now();
        let grant = self.authorization_grant(request)?;
        let mut session = self.store.begin()?;
        let authorization = grant.validate(self, session.as_ref(), now, request)?;
        let target = authorization.target.clone();

        let Some(user) = grant_user else {
            tracing::info!("Authorization denied for client {}", authorization.client.client_id);
            return Err(AuthorizationError::redirect(OAuth2Error::access_denied(), target));
        };

        let params = grant
            .create_response(self, session.as_mut(), now, request, &authorization, user)
            .map_err(|e| AuthorizationError::redirect(e, target.clone()))?;
        session.commit()?;
        Ok(target.location(params))
    }

    pub fn authorization_error_response(&self, error: &AuthorizationError) -> OAuth2Response {
        match &error.redirect {
            Some(target) => OAuth2Response::Redirect {
                location: target.location(error.error.redirect_params(None)),
            },
            None => OAuth2Response::error(&error.error, None),
        }
    }

    // --- Resource side ---

    /// Resolve a bearer access token that exists, is unexpired and not revoked.
    pub fn validate_bearer(&self, access_token: &str) -> Result<Token, OAuth2Error> {
        let now = self.now();
        let token = read_only(self.store(), |session| {
            Ok::<_, OAuth2Error>(session.find_token_by_access(access_token)?)
        })?;
        match token {
            Some(token) if !token.is_revoked() && !token.is_expired(now) => Ok(token),
            _ => Err(OAuth2Error::invalid_token()),
        }
    }

    /// The user-info claims for the owner of `access_token`.
    pub fn user_info(&self, access_token: &str) -> Result<Map<String, Value>, OAuth2Error> {
        let token = self.validate_bearer(access_token)?;
        let Some(user_id) = token.user_id else {
            return Err(OAuth2Error::InsufficientScope(
                "The access token has no end-user.".to_string(),
            ));
        };
        if !is_openid_scope(Some(token.scope.as_str())) {
            return Err(OAuth2Error::InsufficientScope(
                "The access token lacks the \"openid\" scope.".to_string(),
            ));
        }
        let user = self.find_user(user_id)?.ok_or_else(OAuth2Error::invalid_token)?;
        Ok(self.user_info.user_info(&user, &token.scope))
    }

    pub fn find_user(&self, user_id: i64) -> Result<Option<User>, OAuth2Error> {
        read_only(self.store(), |session| Ok(session.find_user(user_id)?))
    }

    // --- Metadata ---

    pub fn issuer_name(&self) -> Option<&str> {
        self.openid.as_ref().map(OpenIdExtension::issuer)
    }

    pub fn grant_types_supported(&self) -> Vec<&'static str> {
        let mut grant_types: Vec<&'static str> = TokenGrant::registered(self)
            .iter()
            .map(TokenGrant::grant_type)
            .collect();
        if AuthorizationGrant::registered(self.config.profile)
            .iter()
            .any(|g| matches!(g, AuthorizationGrant::Implicit | AuthorizationGrant::OpenIdImplicit))
        {
            grant_types.push("implicit");
        }
        grant_types
    }

    pub fn response_types_supported(&self) -> Vec<&'static str> {
        AuthorizationGrant::registered(self.config.profile)
            .iter()
            .flat_map(|g| g.response_types().iter().copied())
            .collect()
    }

    pub fn response_modes_supported(&self) -> Vec<&'static str> {
        vec![ResponseMode::Query.as_str(), ResponseMode::Fragment.as_str()]
    }

    pub fn token_endpoint_auth_methods_supported(&self) -> Vec<&'static str> {
        SECRET_AUTH_METHODS.iter().map(|m| m.as_str()).collect()
    }

    pub fn code_challenge_methods_supported(&self) -> Vec<&'static str> {
        ChallengeMethod::SUPPORTED.to_vec()
    }

    /// JWS algorithm name for ID tokens, when OpenID is enabled.
    pub fn id_token_signing_alg(&self) -> Option<String> {
        self.openid.as_ref().map(|o| format!("{:?}", o.algorithm()))
    }

    pub fn scopes_supported(&self) -> Option<&[String]> {
        self.config.scopes_supported.as_deref()
    }
}

/// Wires deployment hooks into an [`AuthorizationServer`] and validates the config.
pub struct AuthorizationServerBuilder {
    config: ServerConfig,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    generators: GeneratorRegistry,
    signer: Option<Arc<dyn IdTokenSigner>>,
    user_info: Arc<dyn UserInfoProvider>,
    password: Option<Arc<dyn PasswordVerifier>>,
}

impl AuthorizationServerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a token generator that `{"kind": "named"}` config entries can refer to.
    pub fn generator<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TokenContext<'_>) -> String + Send + Sync + 'static,
    {
        self.generators.register(name, Arc::new(f));
        self
    }

    /// Replace the config-derived JWT signer.
    pub fn signer(mut self, signer: impl IdTokenSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn user_info(mut self, provider: impl UserInfoProvider + 'static) -> Self {
        self.user_info = Arc::new(provider);
        self
    }

    /// Enable the password grant.
    pub fn password_verifier(mut self, verifier: impl PasswordVerifier + 'static) -> Self {
        self.password = Some(Arc::new(verifier));
        self
    }

    pub fn build(self) -> Result<AuthorizationServer, ConfigError> {
        let config = self.config;
        if config.code_lifetime_secs <= 0 {
            return Err(ConfigError::InvalidLifetime(format!(
                "code_lifetime_secs must be positive, got {}",
                config.code_lifetime_secs
            )));
        }

        let expires_in = ExpiresIn::with_overrides(&config.expires_in)?;
        let access = self
            .generators
            .resolve(&config.access_token_generator, DEFAULT_ACCESS_TOKEN_LENGTH)?;
        let refresh = self
            .generators
            .resolve(&config.refresh_token_generator, DEFAULT_REFRESH_TOKEN_LENGTH)?;
        let issuer = TokenIssuer::new(access, refresh, expires_in)?;

        let jwt = config.jwt.resolve()?;
        let openid = match config.profile {
            Profile::OpenId => {
                let signer: Arc<dyn IdTokenSigner> = match self.signer {
                    Some(signer) => signer,
                    None => Arc::new(JwtSigner::new(&jwt)?),
                };
                Some(OpenIdExtension::new(&jwt, signer, self.user_info.clone()))
            }
            Profile::OAuth2 => None,
        };

        let server = AuthorizationServer {
            store: self.store,
            clock: self.clock,
            codes: CodeEngine::new(config.code_lifetime_secs),
            pkce: CodeChallenge {
                required: config.profile == Profile::OAuth2,
            },
            issuer,
            openid,
            user_info: self.user_info,
            password: self.password,
            config,
        };
        tracing::info!("Authorization server ready: {:?}", server);
        Ok(server)
    }
}
