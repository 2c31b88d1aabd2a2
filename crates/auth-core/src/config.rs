//! Engine configuration as it appears in the config file.
//!
//! Every field is optional in the file. Partial values are merged over the
//! defaults and validated once, when the server is built.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::code::DEFAULT_CODE_LIFETIME;
use crate::openid::JwtOverrides;
use crate::token::GeneratorConfig;

/// Which set of grants the server registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    /// Plain OAuth 2.0 with PKCE required for public clients
    #[serde(rename = "oauth2")]
    OAuth2,
    /// OpenID Connect: ID tokens, nonces, hybrid flow
    #[default]
    #[serde(rename = "openid")]
    OpenId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub profile: Profile,

    /// ID token signing overrides
    #[serde(default)]
    pub jwt: JwtOverrides,

    #[serde(default = "default_access_token_generator")]
    pub access_token_generator: GeneratorConfig,

    #[serde(default = "default_refresh_token_generator")]
    pub refresh_token_generator: GeneratorConfig,

    /// Token lifetime overrides keyed by grant type
    #[serde(default)]
    pub expires_in: HashMap<String, u64>,

    /// Hand out a new refresh token when one is redeemed
    #[serde(default)]
    pub include_new_refresh_token: bool,

    #[serde(default = "default_code_lifetime")]
    pub code_lifetime_secs: i64,

    /// Server-wide scope allow-list; `None` accepts any scope
    #[serde(default)]
    pub scopes_supported: Option<Vec<String>>,
}

fn default_access_token_generator() -> GeneratorConfig {
    GeneratorConfig::Random { length: None }
}

fn default_refresh_token_generator() -> GeneratorConfig {
    GeneratorConfig::Random { length: None }
}

fn default_code_lifetime() -> i64 {
    DEFAULT_CODE_LIFETIME
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            jwt: JwtOverrides::default(),
            access_token_generator: default_access_token_generator(),
            refresh_token_generator: default_refresh_token_generator(),
            expires_in: HashMap::new(),
            include_new_refresh_token: false,
            code_lifetime_secs: default_code_lifetime(),
            scopes_supported: None,
        }
    }
}

impl ServerConfig {
    /// Whether every requested scope is in `scopes_supported`.
    pub fn check_scopes(&self, scope: Option<&str>) -> bool {
        match (&self.scopes_supported, scope) {
            (Some(supported), Some(scope)) => scope
                .split_whitespace()
                .all(|item| supported.iter().any(|s| s == item)),
            _ => true,
        }
    }
}
