//! OAuth 2.0 / OpenID Connect authorization service
//!
//! Provides:
//! - Authorization endpoint with consent page (code, implicit, hybrid)
//! - Token endpoint (authorization_code, refresh_token, client_credentials)
//! - RFC 8414 and OpenID discovery metadata
//! - UserInfo endpoint
//! - Bearer token validation for forward-auth proxies
//!
//! End-users are authenticated upstream; the proxy passes the user id in a
//! trusted header (see `Config::user_header`).

mod config;
mod oauth;
mod userinfo;
mod validation;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use auth_core::{AuthorizationServer, MemoryStore};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use clap::Parser;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::oauth::consent::ConsentKey;

#[derive(Parser, Debug)]
#[command(name = "auth-service")]
#[command(about = "OAuth 2.0 / OpenID Connect authorization service")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3001, env = "AUTH_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "AUTH_BIND")]
    bind: String,

    /// Config directory (config.json plus users/clients/tokens snapshots)
    #[arg(long, default_value = "/config", env = "AUTH_CONFIG_PATH")]
    config_path: String,

    /// Public URL for this service (used in discovery metadata and as the default ID token issuer)
    #[arg(long, env = "AUTH_PUBLIC_URL")]
    public_url: String,
}

/// Shared application state
pub struct AppState {
    pub server: AuthorizationServer,
    pub config: Config,
    pub public_url: String,
    pub consent: ConsentKey,
}

/// The service router.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth::metadata::oauth_handler),
        )
        .route(
            "/.well-known/openid-configuration",
            get(oauth::metadata::openid_handler),
        )
        .route(
            "/authorize",
            get(oauth::authorize::get_handler).post(oauth::authorize::post_handler),
        )
        .route("/token", axum::routing::post(oauth::token::handler))
        .route("/userinfo", get(userinfo::handler).post(userinfo::handler))
        .route("/validate", get(validation::handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auth_service=info,auth_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config_path)?;
    config
        .server
        .jwt
        .iss
        .get_or_insert_with(|| cli.public_url.trim_end_matches('/').to_string());

    let store = MemoryStore::open(&cli.config_path)
        .with_context(|| format!("Failed to open store in {}", cli.config_path))?;
    let server = config
        .build_server(store)
        .context("Invalid engine configuration in config.json")?;
    let consent = ConsentKey::new(config.consent_secret.as_deref())
        .map_err(|e| anyhow::anyhow!("Invalid consent_secret: {}", e))?;

    let state = Arc::new(AppState {
        server,
        config,
        public_url: cli.public_url.clone(),
        consent,
    });

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port)
        .parse()
        .context("Invalid bind address")?;

    tracing::info!("Starting auth-service on {}", addr);
    tracing::info!("Public URL: {}", cli.public_url);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Auth service shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
