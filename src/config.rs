use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use snafu::{Location, ResultExt, Snafu};
use url::Url;

use crate::Located;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// could not read the `{prefix}*` settings from the environment
    #[snafu(display("could not read the `{prefix}*` settings from the environment at {location}: {source}"))]
    ConfigLoad {
        prefix: &'static str,
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Located for ConfigError {
    fn location(&self) -> Location {
        match self {
            ConfigError::ConfigLoad { location, .. } => *location,
        }
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub transport: TransportConfig,
    pub log: LogConfig,
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        Ok(Config {
            database: DatabaseConfig::from_env()?,
            model: prefixed("LLM_")?,
            transport: prefixed("TRANSPORT_")?,
            log: LogConfig::from_env()?,
        })
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<DatabaseConfig, ConfigError> {
        prefixed("DATABASE_")
    }
}

impl LogConfig {
    pub fn from_env() -> Result<LogConfig, ConfigError> {
        prefixed("LOG_")
    }
}

fn prefixed<T: serde::de::DeserializeOwned>(prefix: &'static str) -> Result<T, ConfigError> {
    envy::prefixed(prefix)
        .from_env::<T>()
        .context(ConfigLoadSnafu { prefix })
}

/// `DATABASE_*`
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Url,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout", deserialize_with = "duration")]
    pub acquire_timeout: Duration,
    /// server-side limit per statement, never zero since `statement_timeout = 0` means no limit
    #[serde(default = "default_query_timeout", deserialize_with = "positive_duration")]
    pub query_timeout: Duration,
}

/// `LLM_*`
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// name of the model served by Ollama, e.g. `qwen2.5-coder:7b`
    pub model: String,
    #[serde(default = "default_model_url")]
    pub url: Url,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model_timeout", deserialize_with = "duration")]
    pub timeout: Duration,
}

/// `TRANSPORT_*`
#[derive(Deserialize, Clone)]
pub struct TransportConfig {
    /// shared secret the chat transport presents with every message
    pub token: String,
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("token", &"<redacted>")
            .field("address", &self.address)
            .finish()
    }
}

/// `LOG_*`
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

fn positive_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let duration = duration(deserializer)?;
    if duration.is_zero() {
        return Err(serde::de::Error::custom("duration must be greater than zero"));
    }

    Ok(duration)
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_model_url() -> Url {
    Url::parse("http://localhost:11434").expect("default model url is valid")
}

fn default_temperature() -> f32 {
    0.1
}

fn default_model_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_dir() -> String {
    "logs".to_string()
}
