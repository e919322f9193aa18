//! Configuration data structures for tether.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! to `TETHER_*` environment variables. Every field has a default so an empty
//! configuration is a working one.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    adapters::pipeline::{DEFAULT_COMPRESSION_LEVEL, PipelineSettings},
    core::token::{DEFAULT_TTL, TokenIssuer},
};

/// Port used when neither the file nor `PORT` supplies one.
pub const DEFAULT_PORT: &str = "8080";

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_drain_timeout_secs() -> u64 {
    5
}

fn default_compression_level() -> u32 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TTL.as_secs()
}

/// Output format of the log subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Claims given to the token minted for every request
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl_secs(),
            scopes: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Kept as a string so an explicitly empty value can be told apart from a missing one.
    #[serde(default = "default_port")]
    pub port: String,
    /// Upper bound on the graceful drain after an interrupt.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Gzip quality, 0 (fastest) to 9 (best).
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub token: TokenConfig,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(Duration::from_secs(self.token.ttl_secs))
            .with_scopes(self.token.scopes.iter().cloned())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            issuer: self.token_issuer(),
            compression_level: self.compression_level,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            drain_timeout_secs: default_drain_timeout_secs(),
            compression_level: default_compression_level(),
            log: LogConfig::default(),
            token: TokenConfig::default(),
        }
    }
}
