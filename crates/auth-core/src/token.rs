//! Bearer token generation, expiry table and issuance.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, OAuth2Error};
use crate::models::{Client, Token, User};
use crate::store::Session;

pub const DEFAULT_ACCESS_TOKEN_LENGTH: usize = 42;
pub const DEFAULT_REFRESH_TOKEN_LENGTH: usize = 48;

/// Lifetime for grant types missing from the expiry table.
pub const DEFAULT_EXPIRES_IN: u64 = 3600;

const DEFAULT_EXPIRES_IN_TABLE: [(&str, u64); 4] = [
    ("authorization_code", 864000),
    ("implicit", 3600),
    ("password", 864000),
    ("client_credentials", 864000),
];

/// Random alphanumeric string of `len` characters.
pub fn generate_token(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Everything a generator function may base a token on.
#[derive(Debug, Clone, Copy)]
pub struct TokenContext<'a> {
    pub client: &'a Client,
    pub grant_type: &'a str,
    pub user: Option<&'a User>,
    pub scope: &'a str,
    pub expires_in: u64,
    pub include_refresh_token: bool,
}

pub type GeneratorFn = Arc<dyn Fn(&TokenContext<'_>) -> String + Send + Sync>;

/// A resolved token generator.
#[derive(Clone)]
pub enum TokenGenerator {
    Random { length: usize },
    Function(GeneratorFn),
    Disabled,
}

impl TokenGenerator {
    fn generate(&self, ctx: &TokenContext<'_>) -> Option<String> {
        match self {
            TokenGenerator::Random { length } => Some(generate_token(*length)),
            TokenGenerator::Function(f) => Some(f(ctx)),
            TokenGenerator::Disabled => None,
        }
    }
}

impl fmt::Debug for TokenGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenGenerator::Random { length } => write!(f, "Random({})", length),
            TokenGenerator::Function(_) => f.write_str("Function"),
            TokenGenerator::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Generator as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratorConfig {
    Random {
        #[serde(default)]
        length: Option<usize>,
    },
    /// A function registered with the server builder under `name`
    Named { name: String },
    Disabled,
}

/// Generator functions a deployment registers by name before the config is resolved.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    functions: HashMap<String, GeneratorFn>,
}

impl GeneratorRegistry {
    pub fn register(&mut self, name: impl Into<String>, f: GeneratorFn) {
        self.functions.insert(name.into(), f);
    }

    pub fn resolve(
        &self,
        config: &GeneratorConfig,
        default_length: usize,
    ) -> Result<TokenGenerator, ConfigError> {
        match config {
            GeneratorConfig::Random { length } => {
                let length = length.unwrap_or(default_length);
                if length == 0 {
                    return Err(ConfigError::InvalidGenerator(
                        "random token length must be positive".to_string(),
                    ));
                }
                Ok(TokenGenerator::Random { length })
            }
            GeneratorConfig::Named { name } => self
                .functions
                .get(name)
                .cloned()
                .map(TokenGenerator::Function)
                .ok_or_else(|| ConfigError::UnknownGenerator(name.clone())),
            GeneratorConfig::Disabled => Ok(TokenGenerator::Disabled),
        }
    }
}

/// Per-grant-type token lifetimes.
#[derive(Debug, Clone)]
pub struct ExpiresIn {
    table: HashMap<String, u64>,
}

impl Default for ExpiresIn {
    fn default() -> Self {
        Self {
            table: DEFAULT_EXPIRES_IN_TABLE
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

impl ExpiresIn {
    /// Layer overrides over the defaults. Keys must be grant types in the default table.
    pub fn with_overrides(overrides: &HashMap<String, u64>) -> Result<Self, ConfigError> {
        let mut expires_in = Self::default();
        for (grant_type, secs) in overrides {
            if !expires_in.table.contains_key(grant_type) {
                return Err(ConfigError::UnknownGrantType(grant_type.clone()));
            }
            if i64::try_from(*secs).is_err() {
                return Err(ConfigError::InvalidLifetime(format!(
                    "expires_in for {} is out of range: {}",
                    grant_type, secs
                )));
            }
            expires_in.table.insert(grant_type.clone(), *secs);
        }
        Ok(expires_in)
    }

    pub fn get(&self, _client: &Client, grant_type: &str) -> u64 {
        self.table
            .get(grant_type)
            .copied()
            .unwrap_or(DEFAULT_EXPIRES_IN)
    }
}

/// Token endpoint success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub token_type: String,
    pub access_token: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl BearerToken {
    /// Key/value pairs for delivery through a redirect.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("access_token".to_string(), self.access_token.clone()),
            ("token_type".to_string(), self.token_type.clone()),
            ("expires_in".to_string(), self.expires_in.to_string()),
        ];
        if let Some(refresh_token) = &self.refresh_token {
            params.push(("refresh_token".to_string(), refresh_token.clone()));
        }
        if let Some(scope) = &self.scope {
            params.push(("scope".to_string(), scope.clone()));
        }
        params
    }
}

/// Inputs to a single issuance.
#[derive(Debug, Clone, Copy)]
pub struct IssueRequest<'a> {
    pub client: &'a Client,
    pub grant_type: &'a str,
    pub user: Option<&'a User>,
    pub scope: Option<&'a str>,
    /// Overrides the table lookup, as refresh does to keep the original lifetime
    pub expires_in: Option<u64>,
    pub include_refresh_token: bool,
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    access: TokenGenerator,
    refresh: TokenGenerator,
    expires_in: ExpiresIn,
}

impl TokenIssuer {
    pub fn new(
        access: TokenGenerator,
        refresh: TokenGenerator,
        expires_in: ExpiresIn,
    ) -> Result<Self, ConfigError> {
        if matches!(access, TokenGenerator::Disabled) {
            return Err(ConfigError::InvalidGenerator(
                "the access token generator cannot be disabled".to_string(),
            ));
        }
        Ok(Self {
            access,
            refresh,
            expires_in,
        })
    }

    pub fn expires_in(&self, client: &Client, grant_type: &str) -> u64 {
        self.expires_in.get(client, grant_type)
    }

    /// Generate a token pair and persist it in `session`.
    pub fn issue(
        &self,
        session: &mut dyn Session,
        now: i64,
        req: IssueRequest<'_>,
    ) -> Result<BearerToken, OAuth2Error> {
        let scope = req.client.allowed_scope(req.scope.unwrap_or_default());
        let expires_in = req
            .expires_in
            .unwrap_or_else(|| self.expires_in(req.client, req.grant_type));
        let ctx = TokenContext {
            client: req.client,
            grant_type: req.grant_type,
            user: req.user,
            scope: &scope,
            expires_in,
            include_refresh_token: req.include_refresh_token,
        };

        let access_token = self
            .access
            .generate(&ctx)
            .ok_or_else(OAuth2Error::server_error)?;
        let refresh_token = if req.include_refresh_token {
            self.refresh.generate(&ctx)
        } else {
            None
        };

        session.save_token(Token {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            token_type: "Bearer".to_string(),
            client_id: req.client.client_id.clone(),
            user_id: req.user.map(|u| u.id),
            scope: scope.clone(),
            issued_at: now,
            expires_in,
            revoked: false,
        })?;
        tracing::info!(
            "Issued {} token for client {} (refresh: {})",
            req.grant_type,
            req.client.client_id,
            refresh_token.is_some()
        );

        Ok(BearerToken {
            token_type: "Bearer".to_string(),
            access_token,
            expires_in,
            refresh_token,
            scope: Some(scope).filter(|s| !s.is_empty()),
            id_token: None,
        })
    }
}
