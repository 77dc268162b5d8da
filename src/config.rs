//! Configuration module for chatrelay.

use serde::Deserialize;
use std::path::Path;

use crate::chat::MAX_STANDARD_WINDOW_HOURS;
use crate::{RelayError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timezone used to format message timestamps (e.g., "Europe/Berlin", "UTC").
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timezone: default_timezone(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/chatrelay.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/chatrelay.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// History retrieval configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// How far back standard-tier users can see, in hours.
    #[serde(default = "default_standard_window_hours")]
    pub standard_window_hours: i64,
}

fn default_standard_window_hours() -> i64 {
    24
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            standard_window_hours: default_standard_window_hours(),
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Capacity of each session's outbound event queue.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

fn default_outbound_queue() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// Identity provider integration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Request header carrying the authenticated username, set by the
    /// identity provider in front of the relay.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

fn default_user_header() -> String {
    "x-forwarded-user".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// History retrieval configuration.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Identity provider integration.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(RelayError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CHATRELAY_DATABASE_PATH`: Override the database path
    /// - `CHATRELAY_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CHATRELAY_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(level) = std::env::var("CHATRELAY_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.history.standard_window_hours <= 0 {
            return Err(RelayError::Config(
                "history.standard_window_hours must be positive".to_string(),
            ));
        }
        if self.history.standard_window_hours > MAX_STANDARD_WINDOW_HOURS {
            return Err(RelayError::Config(format!(
                "history.standard_window_hours must be at most {MAX_STANDARD_WINDOW_HOURS}"
            )));
        }
        if self.session.outbound_queue == 0 {
            return Err(RelayError::Config(
                "session.outbound_queue must be at least 1".to_string(),
            ));
        }
        if self.server.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(RelayError::Config(format!(
                "unknown timezone: {}",
                self.server.timezone
            )));
        }
        if self.auth.user_header.trim().is_empty() {
            return Err(RelayError::Config(
                "auth.user_header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
