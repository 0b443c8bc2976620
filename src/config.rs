//! Configuration loading from TOML with environment overrides.
//!
//! Reads `config.toml` (or the file named by `DICEBET_CONFIG`) and
//! deserializes into strongly-typed structs. The database URL may be
//! overridden with `DICEBET_DATABASE_URL`, typically set in `.env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Env var naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "DICEBET_CONFIG";

/// Env var overriding `database.url`.
pub const DATABASE_URL_ENV: &str = "DICEBET_DATABASE_URL";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub betting: BettingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BettingConfig {
    /// Attempts per placement when the balance row moved underneath it.
    pub settle_attempts: u32,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self { settle_attempts: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "dicebet=info".to_string(),
            json: false,
        }
    }
}

fn default_max_connections() -> u32 {
    8
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load from `DICEBET_CONFIG` (or the default path), then apply env
    /// overrides.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::load(&path)?;
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database.url = url;
        }
        Ok(config)
    }

    /// `host:port` for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
