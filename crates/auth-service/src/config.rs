//! Configuration loading

use std::path::Path;

use anyhow::{Context, Result};
use auth_core::{AuthorizationServer, ConfigError, ServerConfig, Store};
use serde::{Deserialize, Serialize};

/// Contents of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine settings (profile, jwt, generators, lifetimes, scopes)
    #[serde(flatten)]
    pub server: ServerConfig,

    /// Skip the consent page when the end-user is already authenticated
    #[serde(default)]
    pub auto_approve: bool,

    /// Trusted header carrying the authenticated end-user id, set by the fronting proxy
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Key for consent form tokens. If not set, a random key is generated at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_secret: Option<String>,
}

fn default_user_header() -> String {
    "x-authenticated-user".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auto_approve: false,
            user_header: default_user_header(),
            consent_secret: None,
        }
    }
}

impl Config {
    /// Load `config.json` from the config directory, writing the defaults if it is missing.
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if !config_file.exists() {
            let config = Config::default();
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("No config found, wrote defaults to {:?}", config_file);
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_file))?;
        tracing::info!(
            "Loaded configuration from {:?} (profile {:?})",
            config_file,
            config.server.profile
        );
        Ok(config)
    }

    /// Resolve and validate the engine settings against `store`.
    pub fn build_server(&self, store: impl Store + 'static) -> Result<AuthorizationServer, ConfigError> {
        AuthorizationServer::builder(self.server.clone(), store).build()
    }
}
