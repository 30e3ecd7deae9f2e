//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Game endpoint binding address (WebSocket + health)
    pub server_addr: SocketAddr,
    /// Physics configuration side channel binding address
    pub config_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Allowed client origins for CORS; empty allows any origin
    pub client_origins: Vec<String>,

    /// Spawn synthetic players
    pub bots_enabled: bool,
    pub bots_count: usize,

    /// Seed for spawn positions and color fallback
    pub world_seed: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match get("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => get("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };
        let config_addr = get("CONFIG_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string());

        let client_origins = get("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("SERVER_ADDR"))?,
            config_addr: config_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("CONFIG_ADDR"))?,

            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            client_origins,

            bots_enabled: parse_or(&get, "BOTS_ENABLED", false)?,
            bots_count: parse_or(&get, "BOTS_COUNT", 0)?,

            world_seed: get("WORLD_SEED")
                .map(|raw| raw.parse().map_err(|_| ConfigError::Invalid("WORLD_SEED")))
                .transpose()?,
        })
    }

    /// Number of bots to spawn, zero when disabled
    pub fn bot_count(&self) -> usize {
        if self.bots_enabled {
            self.bots_count
        } else {
            0
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid address format in {0}")]
    InvalidAddress(&'static str),
}
