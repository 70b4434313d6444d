//! Client configuration.
//!
//! Loaded from a TOML file and/or `REMOTE_RUN_*` environment variables
//! using the config crate. Every field has a default.

use std::{path::Path, time::Duration};

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Endpoint of the public compile-and-run service.
pub const DEFAULT_ENDPOINT: &str = "wss://codedynamic.xueersi.com/api/compileapi/ws/run";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint of the run service.
    pub endpoint: String,
    /// Seconds between keepalive frames.
    pub keepalive_interval_secs: u64,
    /// Seconds to wait for the next event before giving up on a run.
    pub receive_timeout_secs: u64,
    /// Seconds allowed for opening the connection.
    pub connect_timeout_secs: u64,
    /// Surface input echoes as output (known to misbehave).
    pub echo: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            keepalive_interval_secs: 10,
            receive_timeout_secs: 10,
            connect_timeout_secs: 30,
            echo: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a file, with environment overrides.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or if validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        Self::finish(config)
    }

    /// Defaults with environment overrides.
    ///
    /// # Errors
    /// Returns error if an override cannot be parsed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder().add_source(env_source()).build()?;
        Self::finish(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Self::finish(config)
    }

    fn finish(config: ConfigBuilder) -> Result<Self, ConfigError> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "endpoint '{}' is not a ws:// or wss:// URL",
                self.endpoint
            )));
        }
        for (name, value) in [
            ("keepalive_interval_secs", self.keepalive_interval_secs),
            ("receive_timeout_secs", self.receive_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Interval between keepalive frames.
    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Bound on waiting for the next frame during a run.
    #[must_use]
    pub const fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }

    /// Bound on opening the connection.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("REMOTE_RUN").try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(10));
        assert_eq!(config.receive_timeout(), Duration::from_secs(10));
        assert!(!config.echo);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = ClientConfig::parse_toml(
            r#"
endpoint = "ws://127.0.0.1:9000/run"
receive_timeout_secs = 3
"#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/run");
        assert_eq!(config.receive_timeout(), Duration::from_secs(3));
        assert_eq!(config.keepalive_interval_secs, 10);
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = ClientConfig::parse_toml(r#"endpoint = "http://example.com""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let err = ClientConfig::parse_toml("keepalive_interval_secs = 0").unwrap_err();
        assert!(err.to_string().contains("keepalive_interval_secs"));
    }
}
