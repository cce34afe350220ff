//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - Social gate requirements (follow target, retweet target)
//! - POAP event settings
//! - Public app settings handed to the hosting page
//!
//! Secrets are environment-only and never live in the TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub social: SocialConfig,
    pub event: EventConfig,
    pub app: AppConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Social verification requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Account the user must follow before claiming
    pub follow_username: String,
    /// Tweet the user must retweet; absent disables the retweet gate
    #[serde(default)]
    pub tweet_id: Option<String>,
}

/// POAP event settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// Event id (POAP_EVENT_ID env var takes precedence)
    #[serde(default)]
    pub id: String,
    /// Display name fallback when the POAP API is unreachable
    #[serde(default = "default_event_name")]
    pub name: String,
}

fn default_event_name() -> String {
    "POAP".to_string()
}

/// Settings surfaced to the hosting page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Public URL the mini-app is served from (APP_URL env var takes precedence)
    pub public_url: String,
    #[serde(default)]
    pub walletconnect_project_id: Option<String>,
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    /// POAP event id (env var takes precedence over config value)
    pub fn event_id(&self) -> String {
        env_opt("POAP_EVENT_ID").unwrap_or_else(|| self.event.id.clone())
    }

    /// Public app URL (env var takes precedence over config value)
    pub fn public_url(&self) -> String {
        env_opt("APP_URL").unwrap_or_else(|| self.app.public_url.clone())
    }

    /// WalletConnect project id (env var takes precedence over config value)
    pub fn walletconnect_project_id(&self) -> Option<String> {
        env_opt("WALLETCONNECT_PROJECT_ID").or_else(|| self.app.walletconnect_project_id.clone())
    }

    /// Required-follow account (env var takes precedence over config value)
    pub fn follow_username(&self) -> String {
        env_opt("FOLLOW_USERNAME").unwrap_or_else(|| self.social.follow_username.clone())
    }

    /// Retweet-gate tweet id (env var takes precedence over config value)
    pub fn tweet_id(&self) -> Option<String> {
        env_opt("GATE_TWEET_ID").or_else(|| self.social.tweet_id.clone())
    }
}

/// Credentials read from the environment at startup.
///
/// All of these are optional: a missing Redis URL silently disables the
/// claim cache, and missing API credentials make the corresponding
/// outbound call fail at request time. There is no startup validation.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub poap_api_key: Option<String>,
    pub poap_client_id: Option<String>,
    pub poap_client_secret: Option<String>,
    pub poap_secret_code: Option<String>,
    pub twitter_bearer_token: Option<String>,
    pub redis_url: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            poap_api_key: env_opt("POAP_API_KEY"),
            poap_client_id: env_opt("POAP_CLIENT_ID"),
            poap_client_secret: env_opt("POAP_CLIENT_SECRET"),
            poap_secret_code: env_opt("POAP_SECRET_CODE"),
            twitter_bearer_token: env_opt("TWITTER_BEARER_TOKEN"),
            redis_url: env_opt("REDIS_URL"),
        }
    }
}

/// Read an environment variable, treating empty values as unset
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config is validated at compile time,
        // so this should never fail. Using a fallback for robustness.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            social: SocialConfig {
                follow_username: "poapxyz".to_string(),
                tweet_id: None,
            },
            event: EventConfig {
                id: String::new(),
                name: default_event_name(),
            },
            app: AppConfig {
                public_url: "http://localhost:3000".to_string(),
                walletconnect_project_id: None,
            },
        })
    }
}
