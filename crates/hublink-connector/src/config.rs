//! Application configuration.

use crate::error::{AppError, AppResult};
use hublink_conn::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// Prefix of environment overrides, e.g. `HUBLINK_PORT` or
/// `HUBLINK_CONNECTION__RETRY_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "HUBLINK";

/// Hub endpoint, identity and connection tunables for one connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hub host name or IP address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Hub TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Identity sent in every registration packet.
    #[serde(default = "default_key")]
    pub key: String,
    /// Account balance announced when a trade connector registers.
    #[serde(default)]
    pub balance: f64,
    /// Account equity announced when a trade connector registers.
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9101
}

fn default_key() -> String {
    "hublink".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            key: default_key(),
            balance: 0.0,
            equity: 0.0,
            connection: ConnectionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read an optional TOML file through `from_file`, then apply
    /// `HUBLINK_*` environment overrides on top.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let file = Self::from_file(path)?;
            builder = builder.add_source(config::Config::try_from(&file)?);
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// `address:port` for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}
