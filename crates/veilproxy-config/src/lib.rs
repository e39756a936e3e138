#![deny(unsafe_code)]

//! Configuration loading and validation for veilproxy.
//!
//! Loads TOML configuration files and validates them before the daemon
//! starts. Provides the [`AppConfig`] type as the central configuration
//! structure and the [`server`] module for per-homeserver proxy sections.

/// Per-homeserver proxy sections and their resolution.
pub mod server;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use server::{ResolvedServer, ServerConfig, ServerDefaults};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("listen endpoint {endpoint} of server {server:?} is already used by server {previous:?}")]
    DuplicateListenEndpoint {
        server: String,
        previous: String,
        endpoint: SocketAddr,
    },
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon process configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Control-plane bridge tuning.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Values inherited by every server section.
    #[serde(default)]
    pub defaults: ServerDefaults,

    /// Proxied homeservers, keyed by section name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

/// Configuration for the daemon process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the control plane listens on. Falls back to the
    /// built-in default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<String>,

    /// Directory holding the persistent store.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warning", "info", "debug" or "trace".
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warning".to_string()
}

/// Tuning for the event dispatch loop and notification history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interval between dispatch ticks in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of events drained per tick.
    #[serde(default = "default_max_events_per_tick")]
    pub max_events_per_tick: usize,

    /// Number of notifications kept for polling clients.
    #[serde(default = "default_notification_history")]
    pub notification_history: usize,

    /// Number of daemon log entries kept for `/logs`.
    #[serde(default = "default_log_history")]
    pub log_history: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_events_per_tick: default_max_events_per_tick(),
            notification_history: default_notification_history(),
            log_history: default_log_history(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_events_per_tick() -> usize {
    1
}

fn default_notification_history() -> usize {
    256
}

fn default_log_history() -> usize {
    1000
}

/// Log verbosity accepted in `[logging]` and per-server sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Parse a configured level name (case-insensitive).
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" | "warn" => Ok(Self::Warning),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!(
                "unknown log level {other:?}, expected one of error, warning, info, debug, trace"
            )),
        }
    }

    /// The directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), servers = config.servers.len(), "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        LogLevel::parse(&self.logging.level)
            .map_err(|e| ConfigError::Validation(format!("logging.level: {e}")))?;

        if self.daemon.data_dir.is_empty() {
            return Err(ConfigError::Validation(
                "daemon.data_dir must not be empty".to_string(),
            ));
        }
        if self.daemon.socket_path.as_deref() == Some("") {
            return Err(ConfigError::Validation(
                "daemon.socket_path must not be empty when set".to_string(),
            ));
        }

        if self.bridge.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "bridge.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.bridge.max_events_per_tick == 0 {
            return Err(ConfigError::Validation(
                "bridge.max_events_per_tick must be at least 1".to_string(),
            ));
        }
        if self.bridge.notification_history == 0 {
            return Err(ConfigError::Validation(
                "bridge.notification_history must be at least 1".to_string(),
            ));
        }

        self.resolved_servers()?;
        Ok(())
    }

    /// Resolve every server section against `[defaults]`.
    ///
    /// Fails on the first invalid section, and when two sections share a
    /// listen address and port.
    pub fn resolved_servers(&self) -> Result<Vec<ResolvedServer>, ConfigError> {
        let mut seen: HashMap<SocketAddr, String> = HashMap::new();
        let mut resolved = Vec::with_capacity(self.servers.len());

        for (name, raw) in &self.servers {
            let server = ResolvedServer::resolve(name, raw, &self.defaults)?;
            if let Some(previous) = seen.insert(server.listen, name.clone()) {
                return Err(ConfigError::DuplicateListenEndpoint {
                    server: name.clone(),
                    previous,
                    endpoint: server.listen,
                });
            }
            resolved.push(server);
        }

        Ok(resolved)
    }

    /// The global log level. Falls back to `warning` for unvalidated values.
    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.logging.level).unwrap_or(LogLevel::Warning)
    }

    /// Directory holding the persistent store.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.daemon.data_dir)
    }
}
