//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::decoder::Confidence;
use crate::exec::http::HttpTransport;
use crate::exec::{ExecOptions, DEFAULT_ACCEPT, DEFAULT_URL};
use crate::query::QueryResult;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// DalmatinerDB endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub confidence: Confidence,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_accept() -> String {
    DEFAULT_ACCEPT.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            accept: default_accept(),
            timeout_secs: default_timeout(),
            confidence: Confidence::default(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Execution options seeded from this config
    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions::new()
            .url(self.url.clone())
            .header("accept", self.accept.clone())
            .apply_confidence(self.confidence)
    }

    /// HTTP transport honouring the configured timeout
    pub fn transport(&self) -> QueryResult<HttpTransport> {
        HttpTransport::new(self.timeout())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber; `RUST_LOG` wins over `level`
    pub fn init(&self) -> Result<(), ConfigError> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let registry = tracing_subscriber::registry().with(filter);

        let result = if self.format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).try_init()
        } else {
            registry.with(tracing_subscriber::fmt::layer()).try_init()
        };
        result.map_err(|e| ConfigError::Logging(e.to_string()))
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("dalmatiner-query").join("config.toml")),
            Some(PathBuf::from("/etc/dalmatiner-query/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DALMATINER_URL") {
            self.client.url = url;
        }
        if let Ok(accept) = std::env::var("DALMATINER_ACCEPT") {
            self.client.accept = accept;
        }
        if let Ok(timeout) = std::env::var("DALMATINER_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.client.timeout_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid DALMATINER_TIMEOUT_SECS: {}", timeout),
            }
        }

        if let Ok(level) = std::env::var("DALMATINER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("DALMATINER_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# DalmatinerDB Query Configuration
#
# Environment variables override these settings:
# - DALMATINER_URL
# - DALMATINER_ACCEPT
# - DALMATINER_TIMEOUT_SECS
# - DALMATINER_LOG_LEVEL
# - DALMATINER_LOG_FORMAT

[client]
# DalmatinerDB query endpoint
url = "http://localhost:8080"

# Requested response content type
accept = "application/json"

# Request timeout in seconds
timeout_secs = 30

# Confidence channels: off, on or aligned
confidence = "off"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.client.url, "http://localhost:8080");
        assert_eq!(config.client.accept, "application/json");
        assert_eq!(config.client.timeout(), Duration::from_secs(30));
        assert_eq!(config.client.confidence, Confidence::Off);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_config_parses_to_defaults() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();
        assert_eq!(config.client.url, defaults.client.url);
        assert_eq!(config.client.timeout_secs, defaults.client.timeout_secs);
        assert_eq!(config.logging.format, defaults.logging.format);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[client]\nurl = \"http://dalmatiner:8080\"\nconfidence = \"aligned\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.client.url, "http://dalmatiner:8080");
        assert_eq!(config.client.confidence, Confidence::Aligned);
        assert_eq!(config.client.timeout_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[client\nurl = ").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_exec_options_from_client_config() {
        let client = ClientConfig {
            url: "http://db:8080".to_string(),
            confidence: Confidence::On,
            ..ClientConfig::default()
        };
        let options = client.exec_options();
        assert_eq!(options.url.as_deref(), Some("http://db:8080"));
        assert_eq!(options.headers.get("accept").unwrap(), "application/json");
        assert_eq!(options.apply_confidence, Confidence::On);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("DALMATINER_ACCEPT", "application/x-msgpack");
        std::env::set_var("DALMATINER_TIMEOUT_SECS", "not-a-number");
        let config = Config::from_env();
        std::env::remove_var("DALMATINER_ACCEPT");
        std::env::remove_var("DALMATINER_TIMEOUT_SECS");

        assert_eq!(config.client.accept, "application/x-msgpack");
        assert_eq!(config.client.timeout_secs, 30);
    }
}
