//! Router tests: requests go through the full axum stack via `oneshot`.

use std::sync::Arc;

use auth_core::store::transaction;
use auth_core::{
    AuthorizationServer, Client, ClientMetadata, FixedClock, MemoryStore, Profile, Store, StoreError,
    User,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

use crate::config::Config;
use crate::oauth::consent::ConsentKey;
use crate::{app, AppState};

const NOW: i64 = 1_700_000_000;
const REDIRECT: &str = "https://example.com/";
const AUTHORIZE_QUERY: &str =
    "/authorize?response_type=code&client_id=ops&redirect_uri=https%3A%2F%2Fexample.com%2F&state=xyz";

fn seeded_store() -> MemoryStore {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let store = MemoryStore::new();
    transaction(&store, |s| {
        s.save_user(User {
            id: 1,
            name: "admin".to_string(),
        })?;
        s.save_user(User {
            id: 2,
            name: "guest".to_string(),
        })?;
        s.save_client(Client {
            client_id: "ops".to_string(),
            client_secret: Some("ops".to_string()),
            client_metadata: ClientMetadata {
                client_name: Some("Ops <console>".to_string()),
                redirect_uris: strings(&[REDIRECT]),
                grant_types: strings(&[
                    "authorization_code",
                    "implicit",
                    "refresh_token",
                    "client_credentials",
                ]),
                response_types: strings(&["code", "token", "id_token token"]),
                scope: "openid profile".to_string(),
                token_endpoint_auth_method: None,
            },
            user_id: 1,
        })?;
        Ok::<_, StoreError>(())
    })
    .unwrap();
    store
}

fn test_state(config: Config) -> (Arc<AppState>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(NOW));
    let server = AuthorizationServer::builder(config.server.clone(), seeded_store())
        .clock(clock.clone())
        .build()
        .unwrap();
    let state = Arc::new(AppState {
        server,
        config,
        public_url: "https://auth.example.com".to_string(),
        consent: ConsentKey::new(Some("test secret")).unwrap(),
    });
    (state, clock)
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response {
    app(state.clone()).oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn form_post(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn basic_auth(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", client_id, secret)))
}

fn location(response: &Response) -> Url {
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    Url::parse(location).unwrap()
}

fn param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .chain(url::form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes()))
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Render the consent page for user 1 and return its anti-forgery token.
async fn consent_token(state: &Arc<AppState>) -> String {
    let page = send(
        state,
        Request::get(AUTHORIZE_QUERY)
            .header("x-authenticated-user", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = text_body(page).await;
    assert!(html.contains("Ops &lt;console&gt;"));
    assert!(html.contains(r#"value="approve""#));

    let marker = r#"name="consent_token" value=""#;
    let start = html.find(marker).expect("consent token in page") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

fn decision(body: String) -> Request<Body> {
    Request::post(AUTHORIZE_QUERY)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-authenticated-user", "1")
        .body(Body::from(body))
        .unwrap()
}

/// Consent page, approve, and return the issued code.
async fn approve_code(state: &Arc<AppState>) -> String {
    let token = consent_token(state).await;
    let body = format!("decision=approve&consent_token={}", token);
    let redirect = location(&send(state, decision(body)).await);
    assert_eq!(&redirect[..url::Position::AfterPath], REDIRECT);
    assert_eq!(param(&redirect, "state").as_deref(), Some("xyz"));
    param(&redirect, "code").expect("code in redirect")
}

async fn exchange_code(state: &Arc<AppState>, code: &str) -> Response {
    send(
        state,
        form_post(
            "/token",
            &format!(
                "grant_type=authorization_code&code={}&redirect_uri=https%3A%2F%2Fexample.com%2F&client_id=ops&client_secret=ops",
                code
            ),
        ),
    )
    .await
}

#[tokio::test]
async fn test_client_credentials_token() {
    let (state, _clock) = test_state(Config::default());
    let response = send(
        &state,
        form_post("/token", "grant_type=client_credentials&client_id=ops&client_secret=ops"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body = json_body(response).await;
    assert!(body["access_token"].is_string());
    assert_eq!(body["expires_in"], 864000);
    assert_eq!(body["token_type"], "Bearer");
    assert!(body.get("refresh_token").is_none());
}

#[tokio::test]
async fn test_bad_client_secret_is_401() {
    let (state, _clock) = test_state(Config::default());
    let request = Request::post("/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::AUTHORIZATION, basic_auth("ops", "wrong"))
        .body(Body::from("grant_type=client_credentials"))
        .unwrap();
    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic");
    assert_eq!(json_body(response).await["error"], "invalid_client");
}

#[tokio::test]
async fn test_json_token_request() {
    let (state, _clock) = test_state(Config::default());
    let request = Request::post("/token")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, basic_auth("ops", "ops"))
        .body(Body::from(r#"{"grant_type": "client_credentials", "scope": "profile"}"#))
        .unwrap();
    let response = send(&state, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["scope"], "profile");
}

#[tokio::test]
async fn test_code_flow_single_use() {
    let (state, _clock) = test_state(Config::default());
    let code = approve_code(&state).await;

    let first = exchange_code(&state, &code).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body = json_body(first).await;
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());

    let second = exchange_code(&state, &code).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(second).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_refresh_flow_revokes_old_token() {
    let (state, _clock) = test_state(Config::default());
    let code = approve_code(&state).await;
    let pair = json_body(exchange_code(&state, &code).await).await;
    let old_access = pair["access_token"].as_str().unwrap().to_string();
    let refresh_token = pair["refresh_token"].as_str().unwrap().to_string();

    let refresh = |state: Arc<AppState>, refresh_token: String| async move {
        let request = Request::post("/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::AUTHORIZATION, basic_auth("ops", "ops"))
            .body(Body::from(format!("grant_type=refresh_token&refresh_token={}", refresh_token)))
            .unwrap();
        send(&state, request).await
    };

    let response = refresh(state.clone(), refresh_token.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = json_body(response).await;
    assert_ne!(renewed["access_token"], pair["access_token"]);

    let session = state.server.store().begin().unwrap();
    assert!(session.find_token_by_access(&old_access).unwrap().unwrap().is_revoked());
    drop(session);

    let reused = refresh(state.clone(), refresh_token).await;
    assert_eq!(reused.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(reused).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_denied_consent_redirects_with_error() {
    let (state, _clock) = test_state(Config::default());
    let token = consent_token(&state).await;
    let body = format!("decision=deny&consent_token={}", token);
    let redirect = location(&send(&state, decision(body)).await);
    assert_eq!(param(&redirect, "error").as_deref(), Some("access_denied"));
    assert_eq!(param(&redirect, "state").as_deref(), Some("xyz"));
    assert!(param(&redirect, "code").is_none());
}

#[tokio::test]
async fn test_decision_requires_consent_token() {
    let (state, _clock) = test_state(Config::default());

    let forged = send(&state, decision("decision=approve".to_string())).await;
    assert_eq!(forged.status(), StatusCode::FORBIDDEN);
    assert!(forged.headers().get(header::LOCATION).is_none());

    let wrong = send(&state, decision("decision=approve&consent_token=AAAA".to_string())).await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    // A token issued to one user is useless to another.
    let token = consent_token(&state).await;
    let other_user = Request::post(AUTHORIZE_QUERY)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-authenticated-user", "2")
        .body(Body::from(format!("decision=approve&consent_token={}", token)))
        .unwrap();
    assert_eq!(send(&state, other_user).await.status(), StatusCode::FORBIDDEN);

    // Nor does it carry over to a different authorization request.
    let other_request = Request::post(format!("{}&scope=profile", AUTHORIZE_QUERY))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-authenticated-user", "1")
        .body(Body::from(format!("decision=approve&consent_token={}", token)))
        .unwrap();
    assert_eq!(send(&state, other_request).await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_authorize_without_user() {
    let (state, _clock) = test_state(Config::default());
    let page = send(&state, Request::get(AUTHORIZE_QUERY).body(Body::empty()).unwrap()).await;
    assert_eq!(page.status(), StatusCode::UNAUTHORIZED);

    let silent = send(
        &state,
        Request::get(format!("{}&prompt=none", AUTHORIZE_QUERY))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let redirect = location(&silent);
    assert_eq!(param(&redirect, "error").as_deref(), Some("login_required"));
}

#[tokio::test]
async fn test_auto_approve_skips_consent() {
    let config = Config {
        auto_approve: true,
        ..Config::default()
    };
    let (state, _clock) = test_state(config);
    let response = send(
        &state,
        Request::get(AUTHORIZE_QUERY)
            .header("x-authenticated-user", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(param(&location(&response), "code").is_some());
}

#[tokio::test]
async fn test_unknown_client_is_not_redirected() {
    let (state, _clock) = test_state(Config::default());
    let response = send(
        &state,
        Request::get("/authorize?response_type=code&client_id=ghost")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_userinfo_and_validate() {
    let config = Config {
        auto_approve: true,
        ..Config::default()
    };
    let (state, clock) = test_state(config);
    let response = send(
        &state,
        Request::get(
            "/authorize?response_type=id_token%20token&client_id=ops&scope=openid%20profile&nonce=n-1",
        )
        .header("x-authenticated-user", "1")
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    let redirect = location(&response);
    assert!(param(&redirect, "id_token").is_some());
    let access_token = param(&redirect, "access_token").unwrap();
    let bearer = format!("Bearer {}", access_token);

    let info = send(
        &state,
        Request::get("/userinfo")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(info.status(), StatusCode::OK);
    let claims = json_body(info).await;
    assert_eq!(claims["sub"], "1");
    assert_eq!(claims["name"], "admin");

    let valid = send(
        &state,
        Request::get("/validate")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(valid.status(), StatusCode::OK);
    assert_eq!(valid.headers()["x-auth-user-id"], "1");

    clock.advance(3601);
    let expired = send(
        &state,
        Request::get("/validate")
            .header(header::AUTHORIZATION, &bearer)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_userinfo_rejects_client_tokens() {
    let (state, _clock) = test_state(Config::default());
    let token = json_body(
        send(
            &state,
            form_post(
                "/token",
                "grant_type=client_credentials&client_id=ops&client_secret=ops&scope=openid",
            ),
        )
        .await,
    )
    .await;
    let response = send(
        &state,
        Request::get("/userinfo")
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", token["access_token"].as_str().unwrap()),
            )
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let missing = send(&state, Request::get("/userinfo").body(Body::empty()).unwrap()).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_metadata_documents() {
    let (state, _clock) = test_state(Config::default());
    let response = send(
        &state,
        Request::get("/.well-known/openid-configuration")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let metadata = json_body(response).await;
    assert_eq!(metadata["token_endpoint"], "https://auth.example.com/token");
    assert_eq!(metadata["userinfo_endpoint"], "https://auth.example.com/userinfo");
    assert_eq!(metadata["id_token_signing_alg_values_supported"][0], "HS256");
    assert!(metadata["response_types_supported"]
        .as_array()
        .unwrap()
        .contains(&Value::from("code id_token")));

    let mut config = Config::default();
    config.server.profile = Profile::OAuth2;
    let (state, _clock) = test_state(config);
    let oauth = json_body(
        send(
            &state,
            Request::get("/.well-known/oauth-authorization-server")
                .body(Body::empty())
                .unwrap(),
        )
        .await,
    )
    .await;
    assert_eq!(oauth["issuer"], "https://auth.example.com");
    assert!(oauth.get("userinfo_endpoint").is_none());
    assert_eq!(oauth["code_challenge_methods_supported"][1], "S256");

    let missing = send(
        &state,
        Request::get("/.well-known/openid-configuration")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
