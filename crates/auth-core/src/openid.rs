//! OpenID Connect extension: nonce replay protection, ID tokens and user info.

use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::code::CodeEngine;
use crate::error::{ConfigError, OAuth2Error};
use crate::models::{Client, User};
use crate::request::OAuth2Request;
use crate::store::Session;

const DEFAULT_JWT_KEY: &str = "service";
const DEFAULT_JWT_ISS: &str = "service";
const DEFAULT_JWT_ALG: &str = "HS256";
const DEFAULT_JWT_EXP: u64 = 864000;

/// ID token signing profile.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret for HS*, PEM private key otherwise
    pub key: String,
    pub iss: String,
    pub alg: Algorithm,
    /// ID token lifetime in seconds
    pub exp: u64,
}

/// Partial signing profile from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl JwtOverrides {
    /// Merge over the defaults and validate the algorithm.
    pub fn resolve(&self) -> Result<JwtConfig, ConfigError> {
        let alg_name = self.alg.as_deref().unwrap_or(DEFAULT_JWT_ALG);
        let alg = Algorithm::from_str(alg_name)
            .map_err(|_| ConfigError::UnsupportedAlgorithm(alg_name.to_string()))?;
        let exp = self.exp.unwrap_or(DEFAULT_JWT_EXP);
        if i64::try_from(exp).is_err() {
            return Err(ConfigError::InvalidLifetime(format!("jwt exp is out of range: {}", exp)));
        }
        Ok(JwtConfig {
            key: self.key.clone().unwrap_or_else(|| DEFAULT_JWT_KEY.to_string()),
            iss: self.iss.clone().unwrap_or_else(|| DEFAULT_JWT_ISS.to_string()),
            alg,
            exp,
        })
    }
}

/// Signs ID token claim sets.
pub trait IdTokenSigner: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    fn sign(&self, claims: &Map<String, Value>) -> Result<String, OAuth2Error>;
}

/// JWS signer backed by `jsonwebtoken`.
pub struct JwtSigner {
    alg: Algorithm,
    key: EncodingKey,
}

impl JwtSigner {
    pub fn new(config: &JwtConfig) -> Result<Self, ConfigError> {
        let secret = config.key.as_bytes();
        let key = match config.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(EncodingKey::from_secret(secret))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(secret),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(secret),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(secret),
        }
        .map_err(|e| ConfigError::UnsupportedAlgorithm(format!("{:?}: {}", config.alg, e)))?;
        Ok(Self {
            alg: config.alg,
            key,
        })
    }
}

impl IdTokenSigner for JwtSigner {
    fn algorithm(&self) -> Algorithm {
        self.alg
    }

    fn sign(&self, claims: &Map<String, Value>) -> Result<String, OAuth2Error> {
        jsonwebtoken::encode(&Header::new(self.alg), claims, &self.key).map_err(|e| {
            tracing::error!("Failed to sign ID token: {}", e);
            OAuth2Error::server_error()
        })
    }
}

/// Projects a user into OpenID claims.
pub trait UserInfoProvider: Send + Sync {
    fn user_info(&self, user: &User, scope: &str) -> Map<String, Value>;
}

/// `{sub, name}`
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUserInfo;

impl UserInfoProvider for DefaultUserInfo {
    fn user_info(&self, user: &User, _scope: &str) -> Map<String, Value> {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(user.id.to_string()));
        claims.insert("name".to_string(), json!(user.name));
        claims
    }
}

/// Inputs to one ID token.
#[derive(Debug, Clone, Copy)]
pub struct IdTokenRequest<'a> {
    pub client: &'a Client,
    pub user: &'a User,
    pub scope: &'a str,
    pub auth_time: i64,
    pub nonce: Option<&'a str>,
    pub access_token: Option<&'a str>,
    pub code: Option<&'a str>,
}

#[derive(Clone)]
pub struct OpenIdExtension {
    iss: String,
    exp: u64,
    signer: Arc<dyn IdTokenSigner>,
    user_info: Arc<dyn UserInfoProvider>,
}

impl OpenIdExtension {
    pub fn new(
        config: &JwtConfig,
        signer: Arc<dyn IdTokenSigner>,
        user_info: Arc<dyn UserInfoProvider>,
    ) -> Self {
        Self {
            iss: config.iss.clone(),
            exp: config.exp,
            signer,
            user_info,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.iss
    }

    pub fn algorithm(&self) -> Algorithm {
        self.signer.algorithm()
    }

    /// Require a nonce when `required` and reject one already bound to a live code.
    pub fn validate_nonce(
        &self,
        session: &dyn Session,
        codes: &CodeEngine,
        now: i64,
        request: &OAuth2Request,
        required: bool,
    ) -> Result<(), OAuth2Error> {
        let Some(nonce) = request.nonce() else {
            if required {
                return Err(OAuth2Error::invalid_request("Missing \"nonce\" in request."));
            }
            return Ok(());
        };
        if codes.exists_nonce(session, now, nonce)? {
            tracing::warn!("Nonce replay rejected at authorization");
            return Err(OAuth2Error::invalid_request("Replay attack"));
        }
        Ok(())
    }

    pub fn user_info(&self, user: &User, scope: &str) -> Map<String, Value> {
        self.user_info.user_info(user, scope)
    }

    pub fn generate_id_token(&self, now: i64, req: IdTokenRequest<'_>) -> Result<String, OAuth2Error> {
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!(self.iss));
        claims.insert("aud".to_string(), json!([req.client.client_id]));
        claims.insert("iat".to_string(), json!(now));
        let exp = now.saturating_add(i64::try_from(self.exp).unwrap_or(i64::MAX));
        claims.insert("exp".to_string(), json!(exp));
        claims.insert("auth_time".to_string(), json!(req.auth_time));
        if let Some(nonce) = req.nonce {
            claims.insert("nonce".to_string(), json!(nonce));
        }
        let alg = self.signer.algorithm();
        if let Some(access_token) = req.access_token {
            claims.insert("at_hash".to_string(), json!(left_hash(alg, access_token)));
        }
        if let Some(code) = req.code {
            claims.insert("c_hash".to_string(), json!(left_hash(alg, code)));
        }
        claims.extend(self.user_info(req.user, req.scope));

        let id_token = self.signer.sign(&claims)?;
        tracing::info!("Issued ID token for client {}", req.client.client_id);
        Ok(id_token)
    }
}

/// Left half of the digest matching the JWS algorithm, base64url without padding.
fn left_hash(alg: Algorithm, value: &str) -> String {
    let digest: Vec<u8> = match alg {
        Algorithm::HS384 | Algorithm::RS384 | Algorithm::PS384 | Algorithm::ES384 => {
            Sha384::digest(value.as_bytes()).to_vec()
        }
        Algorithm::HS512 | Algorithm::RS512 | Algorithm::PS512 | Algorithm::EdDSA => {
            Sha512::digest(value.as_bytes()).to_vec()
        }
        _ => Sha256::digest(value.as_bytes()).to_vec(),
    };
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
