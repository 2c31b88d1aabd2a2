//! Error types: protocol errors, persistence errors and load-time config errors.

use serde::Serialize;
use thiserror::Error;

/// Terminal outcome of a failed protocol request.
///
/// Each variant carries the `error_description` sent back to the client.
/// Security-sensitive failures (unknown client, wrong or expired code, PKCE
/// mismatch) always use the same description for a given grant so that
/// responses cannot be used to probe which check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuth2Error {
    #[error("invalid_client: {0}")]
    InvalidClient(String),

    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized_client: {0}")]
    UnauthorizedClient(String),

    #[error("access_denied: {0}")]
    AccessDenied(String),

    #[error("server_error: {0}")]
    ServerError(String),

    #[error("unsupported_grant_type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported_response_type: {0}")]
    UnsupportedResponseType(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("login_required: {0}")]
    LoginRequired(String),

    #[error("invalid_token: {0}")]
    InvalidToken(String),

    #[error("insufficient_scope: {0}")]
    InsufficientScope(String),
}

/// JSON error object returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl OAuth2Error {
    pub fn invalid_client() -> Self {
        Self::InvalidClient("Client authentication failed.".to_string())
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::InvalidRequest(description.into())
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::InvalidGrant(description.into())
    }

    pub fn unauthorized_client() -> Self {
        Self::UnauthorizedClient(
            "The client is not authorized to use this grant or response type.".to_string(),
        )
    }

    pub fn access_denied() -> Self {
        Self::AccessDenied(
            "The resource owner or authorization server denied the request.".to_string(),
        )
    }

    pub fn server_error() -> Self {
        Self::ServerError("The authorization server encountered an unexpected condition.".to_string())
    }

    pub fn invalid_token() -> Self {
        Self::InvalidToken("The access token is invalid, expired or revoked.".to_string())
    }

    /// The `error` code defined by RFC 6749 / OpenID Connect.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidClient(_) => "invalid_client",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::InvalidRequest(_) => "invalid_request",
            Self::UnauthorizedClient(_) => "unauthorized_client",
            Self::AccessDenied(_) => "access_denied",
            Self::ServerError(_) => "server_error",
            Self::UnsupportedGrantType(_) => "unsupported_grant_type",
            Self::UnsupportedResponseType(_) => "unsupported_response_type",
            Self::InvalidScope(_) => "invalid_scope",
            Self::LoginRequired(_) => "login_required",
            Self::InvalidToken(_) => "invalid_token",
            Self::InsufficientScope(_) => "insufficient_scope",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::InvalidClient(d)
            | Self::InvalidGrant(d)
            | Self::InvalidRequest(d)
            | Self::UnauthorizedClient(d)
            | Self::AccessDenied(d)
            | Self::ServerError(d)
            | Self::UnsupportedGrantType(d)
            | Self::UnsupportedResponseType(d)
            | Self::InvalidScope(d)
            | Self::LoginRequired(d)
            | Self::InvalidToken(d)
            | Self::InsufficientScope(d) => d,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidClient(_) | Self::InvalidToken(_) => 401,
            Self::InsufficientScope(_) => 403,
            Self::ServerError(_) => 500,
            _ => 400,
        }
    }

    pub fn body(&self, state: Option<&str>) -> ErrorBody {
        ErrorBody {
            error: self.error_code(),
            error_description: Some(self.description().to_string()).filter(|d| !d.is_empty()),
            state: state.map(str::to_string),
        }
    }

    /// Key/value pairs for an error delivered through a redirect.
    pub fn redirect_params(&self, state: Option<&str>) -> Vec<(String, String)> {
        let mut params = vec![("error".to_string(), self.error_code().to_string())];
        if !self.description().is_empty() {
            params.push(("error_description".to_string(), self.description().to_string()));
        }
        if let Some(state) = state {
            params.push(("state".to_string(), state.to_string()));
        }
        params
    }
}

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Conflicting write: {0}")]
    Conflict(String),
}

impl From<StoreError> for OAuth2Error {
    fn from(e: StoreError) -> Self {
        tracing::error!("Store failure, transaction rolled back: {}", e);
        OAuth2Error::server_error()
    }
}

/// Configuration rejected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown grant type in expires_in table: {0}")]
    UnknownGrantType(String),

    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("No token generator registered under the name: {0}")]
    UnknownGenerator(String),

    #[error("Invalid token generator: {0}")]
    InvalidGenerator(String),

    #[error("Invalid lifetime: {0}")]
    InvalidLifetime(String),
}
