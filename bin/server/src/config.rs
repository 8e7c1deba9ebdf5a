//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from `PORTCULLIS_*` environment variables.
//! Nested sections use `__`, e.g. `PORTCULLIS_TOKEN__SECRET_KEY`.
//!
//! See [`TokenConfig`] and [`ProviderConfig`] for the signing and identity
//! provider sections.

use portcullis_access::{ProviderConfig, TokenConfig};
use serde::Deserialize;
use std::fmt;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on. Default: "127.0.0.1:8088"
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Whether the service is only reachable over HTTPS.
    /// Forces the Secure cookie flag and enables HSTS.
    #[serde(default)]
    pub https_only: bool,

    /// Origins allowed to make credentialed cross-origin requests.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Token signing configuration.
    pub token: TokenConfig,

    /// Identity provider configuration. Login is disabled if incomplete.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Login session storage configuration.
    #[serde(default)]
    pub session_store: SessionStoreConfig,
}

fn default_bind_address() -> String {
    "127.0.0.1:8088".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:8088".to_string(),
        "http://127.0.0.1:8088".to_string(),
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

/// Which session store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Redis, with native key expiry.
    Redis,
    /// In-process map, reaped periodically.
    #[default]
    Memory,
}

impl fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStoreConfig {
    /// Backend to use. Default: memory
    #[serde(default)]
    pub backend: SessionBackend,

    /// Redis connection URL, used by the redis backend.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Interval between expired-session sweeps of the memory backend, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            redis_url: default_redis_url(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("PORTCULLIS")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
