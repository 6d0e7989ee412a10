//! Configuration management for Todo Sync Server

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::db::VersionStrategy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Where the upstream identity layer puts the verified user id
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub user_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub version_strategy: VersionStrategy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite:./todo.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                user_header: "x-user-id".to_string(),
            },
            sync: SyncConfig {
                version_strategy: VersionStrategy::Counter,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_var(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            auth: AuthConfig {
                user_header: env::var("AUTH_USER_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or(defaults.auth.user_header),
            },
            sync: SyncConfig {
                version_strategy: parse_var(
                    "SYNC_VERSION_STRATEGY",
                    defaults.sync.version_strategy,
                )?,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}
