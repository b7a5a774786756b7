//! Configuration for the interceptor and the bundled binaries.
//!
//! Loads configuration from TOML files with environment variable substitution.
//!
//! # Example
//!
//! ```toml
//! [barrier]
//! url = "${IFX_BARRIER_URL}"
//! timeout_ms = 5000
//!
//! [server]
//! port = 3000
//!
//! [collector]
//! port = 9000
//!
//! [intercept]
//! mode = "gate"
//! kind = "api"
//! ```

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::EventKind;
use crate::forwarder::{Barrier, Forwarder, DEFAULT_BARRIER_URL, DEFAULT_TIMEOUT};
use crate::intercept::{Interceptor, Mode};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "IFLOGS_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/iflogs.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct IflogsConfig {
    #[serde(default)]
    pub barrier: BarrierConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub intercept: InterceptConfig,

    #[serde(default)]
    pub collector: CollectorConfig,
}

/// Barrier endpoint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BarrierConfig {
    #[serde(default = "default_barrier_url")]
    pub url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for BarrierConfig {
    fn default() -> Self {
        Self {
            url: default_barrier_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_barrier_url() -> String {
    DEFAULT_BARRIER_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

/// Listen configuration for the demo host
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

/// Listen configuration for the reference barrier
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_collector_port")]
    pub port: u16,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            port: default_collector_port(),
        }
    }
}

fn default_collector_port() -> u16 {
    9000
}

/// Interception behaviour
#[derive(Debug, Deserialize, Clone)]
pub struct InterceptConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,

    #[serde(default = "default_kind")]
    pub kind: EventKind,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            kind: default_kind(),
        }
    }
}

fn default_mode() -> Mode {
    Mode::Gate
}

fn default_kind() -> EventKind {
    EventKind::Api
}

impl IflogsConfig {
    /// The barrier described by this configuration
    pub fn barrier(&self) -> Barrier {
        Barrier::new(&self.barrier.url).with_timeout(Duration::from_millis(self.barrier.timeout_ms))
    }

    /// Build an interceptor wired to the configured barrier
    pub fn build_interceptor(&self) -> Interceptor {
        Interceptor::new(Forwarder::new(self.barrier()), self.intercept.kind)
    }

    /// Load configuration from the default path or the IFLOGS_CONFIG env var.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration text, substituting environment variables first.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content);

        debug!("Parsing TOML configuration");
        let config: IflogsConfig = toml::from_str(&content)?;

        config.validate()?;

        info!(
            barrier = %config.barrier.url,
            timeout_ms = config.barrier.timeout_ms,
            mode = %config.intercept.mode,
            kind = %config.intercept.kind,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.barrier.url;

        if url.is_empty() {
            return Err(ConfigError::ValidationError(
                "Barrier url must not be empty".to_string(),
            ));
        }

        if url.contains("${") {
            warn!(
                url = %url,
                "Barrier URL contains unsubstituted environment variable"
            );
        } else if url == DEFAULT_BARRIER_URL {
            warn!("Barrier URL is the 'localhost' placeholder, every push will fail");
        }

        if self.barrier.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Barrier timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    static VAR: OnceLock<Regex> = OnceLock::new();
    let re = VAR.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid")
    });

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                caps[0].to_string()
            }
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("IFLOGS_TEST_BARRIER", "http://10.1.1.1:9000/events");
        let input = "url = \"${IFLOGS_TEST_BARRIER}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "url = \"http://10.1.1.1:9000/events\"");
        env::remove_var("IFLOGS_TEST_BARRIER");
    }

    #[test]
    fn test_env_var_not_set() {
        let input = "url = \"${IFLOGS_NONEXISTENT_VAR}\"";
        let output = substitute_env_vars(input);
        assert_eq!(output, "url = \"${IFLOGS_NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_default_config() {
        let config = IflogsConfig::default();
        assert_eq!(config.barrier.url, "localhost");
        assert_eq!(config.barrier.timeout_ms, 10_000);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.collector.port, 9000);
        assert_eq!(config.intercept.mode, Mode::Gate);
        assert_eq!(config.intercept.kind, EventKind::Api);
    }

    #[test]
    fn test_parse_full_config() {
        let config = IflogsConfig::parse(
            r#"
            [barrier]
            url = "http://barrier.internal:9000/events"
            timeout_ms = 1500

            [server]
            port = 8080

            [collector]
            port = 9100

            [intercept]
            mode = "decorator"
            kind = "auth"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.collector.port, 9100);
        assert_eq!(config.intercept.mode, Mode::Decorator);
        assert_eq!(config.intercept.kind, EventKind::Auth);

        let barrier = config.barrier();
        assert_eq!(barrier.url(), "http://barrier.internal:9000/events");
        assert_eq!(barrier.timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = IflogsConfig::parse("[server]\nport = 4000\n").unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.barrier.url, "localhost");
    }

    #[test]
    fn test_validation_empty_url() {
        let result = IflogsConfig::parse("[barrier]\nurl = \"\"\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let result = IflogsConfig::parse("[barrier]\nurl = \"http://b\"\ntimeout_ms = 0\n");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_mode_is_parse_error() {
        let result = IflogsConfig::parse("[intercept]\nmode = \"passthrough\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = IflogsConfig::load_from("/definitely/not/here/iflogs.toml").unwrap();
        assert_eq!(config.barrier.url, "localhost");
    }
}
