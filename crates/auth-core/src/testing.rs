//! Shared fixtures for unit tests.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use url::{form_urlencoded, Url};

use crate::clock::FixedClock;
use crate::config::{Profile, ServerConfig};
use crate::error::StoreError;
use crate::models::{AuthorizationCode, Client, ClientMetadata, User};
use crate::request::OAuth2Request;
use crate::server::{AuthorizationServer, AuthorizationServerBuilder, OAuth2Response};
use crate::store::{transaction, MemoryStore};
use crate::token::{generate_token, BearerToken};

pub const NOW: i64 = 1_700_000_000;

/// Public client authenticating with `none`.
pub const PUBLIC_CLIENT: &str = "spa";

/// Confidential client limited to the code flow and `profile`.
pub const SECOND_CLIENT: &str = "second";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn user() -> User {
    User {
        id: 1,
        name: "admin".to_string(),
    }
}

/// `ops` / `ops`, allowed every grant and response type.
pub fn confidential_client() -> Client {
    Client {
        client_id: "ops".to_string(),
        client_secret: Some("ops".to_string()),
        client_metadata: ClientMetadata {
            client_name: Some("Ops console".to_string()),
            redirect_uris: strings(&["https://example.com/"]),
            grant_types: strings(&[
                "authorization_code",
                "implicit",
                "refresh_token",
                "client_credentials",
                "password",
            ]),
            response_types: strings(&[
                "code",
                "token",
                "id_token token",
                "id_token",
                "code id_token",
                "code token",
                "code id_token token",
            ]),
            scope: "openid profile".to_string(),
            token_endpoint_auth_method: None,
        },
        user_id: 1,
    }
}

pub fn public_client() -> Client {
    Client {
        client_id: PUBLIC_CLIENT.to_string(),
        client_secret: None,
        client_metadata: ClientMetadata {
            client_name: None,
            redirect_uris: strings(&["https://spa.example.com/cb"]),
            grant_types: strings(&["authorization_code", "implicit"]),
            response_types: strings(&["code", "token"]),
            scope: "openid profile".to_string(),
            token_endpoint_auth_method: Some("none".to_string()),
        },
        user_id: 1,
    }
}

fn second_client() -> Client {
    Client {
        client_id: SECOND_CLIENT.to_string(),
        client_secret: Some("second".to_string()),
        client_metadata: ClientMetadata {
            client_name: None,
            redirect_uris: strings(&["https://second.example.com/cb"]),
            grant_types: strings(&["authorization_code", "refresh_token"]),
            response_types: strings(&["code"]),
            scope: "profile".to_string(),
            token_endpoint_auth_method: None,
        },
        user_id: 1,
    }
}

/// An in-memory store holding [`user`] and the three test clients.
pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    transaction(&store, |s| {
        s.save_user(user())?;
        s.save_client(confidential_client())?;
        s.save_client(public_client())?;
        s.save_client(second_client())?;
        Ok::<_, StoreError>(())
    })
    .expect("seed store");
    store
}

pub fn authorization_code(code: &str) -> AuthorizationCode {
    AuthorizationCode {
        code: code.to_string(),
        client_id: "ops".to_string(),
        user_id: 1,
        redirect_uri: String::new(),
        scope: "profile".to_string(),
        nonce: None,
        code_challenge: None,
        code_challenge_method: None,
        auth_time: NOW,
    }
}

pub fn seed_code(store: &MemoryStore, code: &str, nonce: Option<&str>) {
    let code = AuthorizationCode {
        nonce: nonce.map(str::to_string),
        ..authorization_code(code)
    };
    transaction(store, |s| s.save_code(code).map(|_| ())).expect("seed code");
}

pub fn basic_auth(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", client_id, secret)))
}

pub fn builder() -> AuthorizationServerBuilder {
    AuthorizationServer::builder(ServerConfig::default(), store())
}

/// Build with a [`FixedClock`] pinned at [`NOW`].
pub fn server_from(builder: AuthorizationServerBuilder) -> (AuthorizationServer, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(NOW));
    let server = builder.clock(clock.clone()).build().expect("build test server");
    (server, clock)
}

pub fn server() -> (AuthorizationServer, Arc<FixedClock>) {
    server_from(builder())
}

pub fn server_with(f: impl FnOnce(&mut ServerConfig)) -> (AuthorizationServer, Arc<FixedClock>) {
    let mut config = ServerConfig::default();
    f(&mut config);
    server_from(AuthorizationServer::builder(config, store()))
}

pub fn server_with_profile(profile: Profile) -> (AuthorizationServer, Arc<FixedClock>) {
    server_with(|config| config.profile = profile)
}

pub fn redirect_location(response: &OAuth2Response) -> String {
    match response {
        OAuth2Response::Redirect { location } => location.clone(),
        other => panic!("expected redirect, got {:?}", other),
    }
}

/// Look `key` up in the query, then the fragment, of a redirect location.
pub fn redirect_param(location: &str, key: &str) -> Option<String> {
    let url = Url::parse(location).expect("redirect location is a URL");
    url.query_pairs()
        .chain(form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes()))
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Run the code flow for `ops` and exchange the code.
pub fn issue_code_token(server: &AuthorizationServer, scope: &str) -> BearerToken {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.extend_pairs([("response_type", "code"), ("client_id", "ops"), ("scope", scope)]);
    if scope.split_whitespace().any(|s| s == "openid") {
        query.append_pair("nonce", &generate_token(16));
    }
    let request = OAuth2Request::new("GET", format!("/authorize?{}", query.finish()));
    let location = redirect_location(&server.create_authorization_response(&request, Some(&user())));
    let code = redirect_param(&location, "code").expect("code in redirect");

    let request = OAuth2Request::new("POST", "/token")
        .with_header("Authorization", basic_auth("ops", "ops"))
        .with_form([("grant_type", "authorization_code"), ("code", code.as_str())]);
    server.issue_token(&request).expect("code exchange")
}
