//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `fabgate.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use fabgate_app::config::{EndpointConfig, GatewayConfig};
use fabgate_app::retry::BackoffPolicy;
use fabgate_adapter_broker_mqtt::MqttConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection manager and health monitor tunables.
    pub gateway: GatewaySection,
    /// Equipment endpoints to connect on startup.
    pub equipment: Vec<EndpointConfig>,
    /// MQTT broker settings.
    pub mqtt: MqttConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Connection manager tunables.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Concurrency cap for the startup bulk connect.
    pub max_concurrency: usize,
    /// Health sweep interval, in seconds.
    pub check_interval_secs: u64,
    /// Max heartbeat silence before a connection is deemed stale, in seconds.
    pub staleness_threshold_secs: u64,
    /// Expected heartbeat cadence, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reconnection backoff.
    pub backoff: BackoffSection,
}

/// Reconnection backoff settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackoffSection {
    pub initial_delay_secs: u64,
    pub multiplier: f64,
    pub max_delay_secs: u64,
    pub max_retries: u32,
    pub jitter: bool,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `fabgate.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("fabgate.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FABGATE_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("FABGATE_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Ok(val) = std::env::var("FABGATE_MQTT_PORT") {
            if let Ok(port) = val.parse() {
                self.mqtt.broker_port = port;
            }
        }
        if let Ok(val) = std::env::var("FABGATE_MAX_CONCURRENCY") {
            if let Ok(limit) = val.parse() {
                self.gateway.max_concurrency = limit;
            }
        }
        if let Ok(val) = std::env::var("FABGATE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "gateway.max_concurrency must be non-zero".to_string(),
            ));
        }
        for endpoint in &self.equipment {
            endpoint
                .validate()
                .map_err(|err| ConfigError::Validation(err.to_string()))?;
        }
        Ok(())
    }

    /// The gateway tunables as the application-layer config type.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_concurrency: self.gateway.max_concurrency,
            check_interval: Duration::from_secs(self.gateway.check_interval_secs),
            staleness_threshold: Duration::from_secs(self.gateway.staleness_threshold_secs),
            heartbeat_interval_secs: self.gateway.heartbeat_interval_secs,
            backoff: BackoffPolicy {
                initial_delay: Duration::from_secs(self.gateway.backoff.initial_delay_secs),
                multiplier: self.gateway.backoff.multiplier,
                max_delay: Duration::from_secs(self.gateway.backoff.max_delay_secs),
                max_retries: self.gateway.backoff.max_retries,
                jitter: self.gateway.backoff.jitter,
            },
        }
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            check_interval_secs: 30,
            staleness_threshold_secs: 15 * 60,
            heartbeat_interval_secs: 60,
            backoff: BackoffSection::default(),
        }
    }
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_delay_secs: 1,
            multiplier: 2.0,
            max_delay_secs: 60,
            max_retries: 5,
            jitter: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:fabgate.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "fabgated=info,fabgate=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.max_concurrency, 5);
        assert_eq!(config.gateway.check_interval_secs, 30);
        assert_eq!(config.database.url, "sqlite:fabgate.db?mode=rwc");
        assert!(config.equipment.is_empty());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.gateway.max_concurrency, 5);
        assert_eq!(config.mqtt.broker_port, 1883);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = r#"
            [gateway]
            max_concurrency = 10
            check_interval_secs = 15
            staleness_threshold_secs = 300
            heartbeat_interval_secs = 30

            [gateway.backoff]
            initial_delay_secs = 2
            multiplier = 3.0
            max_delay_secs = 120
            max_retries = 8
            jitter = false

            [[equipment]]
            host = "10.0.0.5"
            port = 5000
            expected_id = "ETCH-01"

            [[equipment]]
            host = "10.0.0.6"
            port = 5000
            timeout_seconds = 60

            [mqtt]
            broker_host = "mqtt.fab.local"

            [database]
            url = "sqlite:line2.db"

            [logging]
            filter = "debug"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.gateway.max_concurrency, 10);
        assert_eq!(config.gateway.backoff.max_retries, 8);
        assert_eq!(config.equipment.len(), 2);
        assert_eq!(config.equipment[0].host, "10.0.0.5");
        assert_eq!(
            config.equipment[0].expected_id.as_ref().unwrap().as_str(),
            "ETCH-01"
        );
        assert_eq!(config.equipment[1].timeout_seconds, 60);
        assert_eq!(config.mqtt.broker_host, "mqtt.fab.local");
        assert_eq!(config.database.url, "sqlite:line2.db");
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.gateway.max_concurrency, 5);
    }

    #[test]
    fn should_reject_zero_concurrency() {
        let mut config = Config::default();
        config.gateway.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_invalid_endpoint() {
        let toml = r#"
            [[equipment]]
            host = "10.0.0.5"
            port = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_convert_gateway_section_to_app_config() {
        let config = Config::default();
        let gateway = config.gateway_config();
        assert_eq!(gateway.max_concurrency, 5);
        assert_eq!(gateway.check_interval, Duration::from_secs(30));
        assert_eq!(gateway.staleness_threshold, Duration::from_secs(900));
        assert_eq!(gateway.backoff.initial_delay, Duration::from_secs(1));
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
