//! The four persisted entities: users, clients, tokens and authorization codes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::client_auth::AuthMethod;

/// An identity principal owned by the deployment's identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

/// Registration metadata of a client (RFC 7591 field names).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    /// Space-delimited scopes the client may be granted
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
}

/// A registered OAuth2 relying party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    /// `None` for public clients
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_metadata: ClientMetadata,
    /// Owning user
    pub user_id: i64,
}

impl Client {
    pub fn token_endpoint_auth_method(&self) -> Option<&str> {
        self.client_metadata.token_endpoint_auth_method.as_deref()
    }

    /// A client without a declared method may authenticate with any enabled method.
    pub fn check_token_endpoint_auth_method(&self, method: AuthMethod) -> bool {
        self.token_endpoint_auth_method()
            .is_none_or(|declared| declared == method.as_str())
    }

    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method() == Some(AuthMethod::None.as_str())
    }

    pub fn check_client_secret(&self, secret: &str) -> bool {
        match &self.client_secret {
            Some(expected) => bool::from(expected.as_bytes().ct_eq(secret.as_bytes())),
            None => false,
        }
    }

    pub fn check_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.client_metadata.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.client_metadata.redirect_uris.first().map(String::as_str)
    }

    pub fn check_grant_type(&self, grant_type: &str) -> bool {
        self.client_metadata.grant_types.iter().any(|gt| gt == grant_type)
    }

    /// Response types compare as sets, so `"token id_token"` matches `"id_token token"`.
    pub fn check_response_type(&self, response_type: &str) -> bool {
        let wanted: BTreeSet<&str> = response_type.split_whitespace().collect();
        self.client_metadata
            .response_types
            .iter()
            .any(|rt| rt.split_whitespace().collect::<BTreeSet<_>>() == wanted)
    }

    /// The requested scopes the client is registered for, in request order.
    pub fn allowed_scope(&self, scope: &str) -> String {
        let registered: BTreeSet<&str> = self.client_metadata.scope.split_whitespace().collect();
        let mut seen = BTreeSet::new();
        scope
            .split_whitespace()
            .filter(|item| registered.contains(item) && seen.insert(*item))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An issued bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub client_id: String,
    /// Absent for client_credentials tokens
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub scope: String,
    pub issued_at: i64,
    pub expires_in: u64,
    #[serde(default)]
    pub revoked: bool,
}

impl Token {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self
            .issued_at
            .saturating_add(i64::try_from(self.expires_in).unwrap_or(i64::MAX))
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    pub fn check_client(&self, client: &Client) -> bool {
        self.client_id == client.client_id
    }
}

/// A single-use, short-lived grant artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: i64,
    pub redirect_uri: String,
    pub scope: String,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    /// Issued-at, unix seconds
    pub auth_time: i64,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: i64, lifetime: i64) -> bool {
        self.auth_time.saturating_add(lifetime) < now
    }
}
