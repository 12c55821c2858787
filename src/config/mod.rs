//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

use std::net::{IpAddr, SocketAddr};

use serde::Deserialize;

use crate::bus::MessagingConfig;
use crate::dlq::DlqConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ACTIVITY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ACTIVITY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ACTIVITY_LOG";
/// Environment variable selecting the log output format (`json` or plain).
pub const LOG_FORMAT_ENV_VAR: &str = "ACTIVITY_LOG_FORMAT";

/// Legacy environment variable for Kafka bootstrap servers.
pub const KAFKA_BROKER_ENV_VAR: &str = "KAFKA_BROKER";
/// Legacy environment variable for the Kafka topic.
pub const KAFKA_TOPIC_ENV_VAR: &str = "KAFKA_TOPIC";
/// Legacy environment variable for the Kafka consumer group.
pub const KAFKA_GROUP_ID_ENV_VAR: &str = "KAFKA_GROUP_ID";
/// Environment variable for the HTTP port.
pub const PORT_ENV_VAR: &str = "PORT";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Broker configuration.
    pub messaging: MessagingConfig,
    /// Dead letter configuration.
    pub dlq: DlqConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the HTTP API.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind the HTTP API on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidValue("server.host", self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy variables `KAFKA_BROKER`, `KAFKA_TOPIC`, `KAFKA_GROUP_ID`, `PORT`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let mut config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply legacy environment variable overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(broker) = std::env::var(KAFKA_BROKER_ENV_VAR) {
            self.messaging.kafka.bootstrap_servers = broker;
        }

        if let Ok(topic) = std::env::var(KAFKA_TOPIC_ENV_VAR) {
            self.messaging.kafka.topic = topic;
        }

        if let Ok(group_id) = std::env::var(KAFKA_GROUP_ID_ENV_VAR) {
            self.messaging.kafka.group_id = group_id;
        }

        if let Ok(port) = std::env::var(PORT_ENV_VAR) {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(PORT_ENV_VAR, port))?;
        }

        Ok(())
    }
}
