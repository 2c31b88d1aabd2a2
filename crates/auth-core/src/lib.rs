//! auth-core: OAuth 2.0 / OpenID Connect authorization and token engine.
//!
//! This crate decides, for each protocol request, whether a client and/or
//! resource owner may obtain a token:
//! - Client authentication (`none`, `client_secret_basic`, `client_secret_post`)
//! - Authorization codes with PKCE and single-use redemption
//! - Bearer token issuance and refresh-token rotation
//! - Grant handlers for authorization_code, implicit, refresh_token,
//!   client_credentials, password and the OpenID hybrid flow
//! - OpenID Connect ID tokens, nonce replay protection and user info
//!
//! Persistence goes through the transactional [`Store`] contract; HTTP lives in
//! the `auth-service` crate.

pub mod client_auth;
pub mod clock;
pub mod code;
pub mod config;
pub mod error;
pub mod grants;
pub mod models;
pub mod openid;
pub mod pkce;
pub mod request;
pub mod scope;
pub mod server;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use client_auth::AuthMethod;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Profile, ServerConfig};
pub use error::{ConfigError, OAuth2Error, StoreError};
pub use grants::password::PasswordVerifier;
pub use models::{AuthorizationCode, Client, ClientMetadata, Token, User};
pub use openid::{IdTokenSigner, JwtConfig, JwtSigner, UserInfoProvider};
pub use request::OAuth2Request;
pub use server::{
    AuthorizationError, AuthorizationServer, AuthorizationServerBuilder, ConsentGrant,
    OAuth2Response, ResponseMode,
};
pub use store::{MemoryStore, Session, Store};
pub use token::{BearerToken, GeneratorConfig, TokenContext};
