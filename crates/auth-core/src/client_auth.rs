//! Client authentication at the token and authorization endpoints.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::OAuth2Error;
use crate::models::Client;
use crate::request::OAuth2Request;
use crate::store::Session;

/// How a client proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Public client: client_id only, no secret
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

impl AuthMethod {
    /// Strategies are tried in this order.
    pub const PRIORITY: [AuthMethod; 3] = [
        AuthMethod::ClientSecretBasic,
        AuthMethod::ClientSecretPost,
        AuthMethod::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ClientSecretBasic => "client_secret_basic",
            AuthMethod::ClientSecretPost => "client_secret_post",
        }
    }

    /// Pull `(client_id, client_secret)` out of the request if this strategy applies.
    fn extract(&self, request: &OAuth2Request) -> Option<(String, Option<String>)> {
        match self {
            AuthMethod::ClientSecretBasic => {
                let header = request.header("authorization")?;
                let (scheme, encoded) = header.split_once(' ')?;
                if !scheme.eq_ignore_ascii_case("basic") {
                    return None;
                }
                let decoded = STANDARD.decode(encoded.trim()).ok()?;
                let decoded = String::from_utf8(decoded).ok()?;
                let (id, secret) = decoded.split_once(':')?;
                let id = decode_credential(id);
                if id.is_empty() {
                    return None;
                }
                Some((id, Some(decode_credential(secret))))
            }
            AuthMethod::ClientSecretPost => {
                let id = request.client_id()?;
                let secret = request.client_secret()?;
                Some((id.to_string(), Some(secret.to_string())))
            }
            AuthMethod::None => {
                if request.client_secret().is_some() {
                    return None;
                }
                request.client_id().map(|id| (id.to_string(), None))
            }
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(AuthMethod::None),
            "client_secret_basic" => Ok(AuthMethod::ClientSecretBasic),
            "client_secret_post" => Ok(AuthMethod::ClientSecretPost),
            other => Err(format!("unknown auth method: {}", other)),
        }
    }
}

/// RFC 6749 §2.3.1: basic credentials are form-urlencoded before base64.
fn decode_credential(value: &str) -> String {
    url::form_urlencoded::parse(format!("v={}", value).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// Authenticate the requesting client with the first enabled strategy that applies.
///
/// Every failure returns the same `invalid_client` error so that callers cannot
/// tell an unknown client from a wrong secret.
pub fn authenticate_client(
    session: &dyn Session,
    request: &OAuth2Request,
    methods: &[AuthMethod],
) -> Result<Client, OAuth2Error> {
    let Some((method, (client_id, secret))) = AuthMethod::PRIORITY
        .iter()
        .filter(|m| methods.contains(m))
        .find_map(|m| m.extract(request).map(|creds| (*m, creds)))
    else {
        tracing::warn!("No usable client credentials in request");
        return Err(OAuth2Error::invalid_client());
    };

    let Some(client) = session.find_client(&client_id)? else {
        tracing::warn!("Unknown client: {}", client_id);
        return Err(OAuth2Error::invalid_client());
    };

    if !client.check_token_endpoint_auth_method(method) {
        tracing::warn!("Client {} may not authenticate with {}", client_id, method);
        return Err(OAuth2Error::invalid_client());
    }

    if let Some(secret) = secret
        && !client.check_client_secret(&secret)
    {
        tracing::warn!("Client secret mismatch for {}", client_id);
        return Err(OAuth2Error::invalid_client());
    }

    tracing::debug!("Authenticated client {} via {}", client_id, method);
    Ok(client)
}
