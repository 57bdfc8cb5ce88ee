//! # Configuration Management
//!
//! Centralized configuration for sessions, services, connectors, the scheduler,
//! the RPC layer and logging.
//!
//! Every section has defaults matching the framework's built-in constants, so an
//! empty TOML document is a valid configuration.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - `STNET_*` environment variable overrides via `from_env()`
//!
//! Durations are written as integer milliseconds.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Initial size of a session's read buffer
pub const DEFAULT_READ_BUFFER: usize = 1024;

/// Outbound queue length of a session
pub const DEFAULT_SEND_QUEUE: usize = 256;

/// Event queue length of a service or connect
pub const DEFAULT_SERVICE_QUEUE: usize = 1024;

/// Events handled per service per scheduler tick
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Largest frame a record-oriented strategy accepts (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct NetworkConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub connector: ConnectorConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(val) = env_parse::<usize>("STNET_SEND_QUEUE")? {
            config.session.send_queue = val;
        }
        if let Some(val) = env_parse::<u64>("STNET_SEND_TIMEOUT_MS")? {
            config.session.send_timeout = Duration::from_millis(val);
        }
        if let Some(val) = env_parse::<usize>("STNET_READ_BUFFER")? {
            config.session.read_buffer = val;
        }
        if let Some(val) = env_parse::<usize>("STNET_SERVICE_QUEUE")? {
            config.service.queue_len = val;
        }
        if let Some(val) = env_parse::<u64>("STNET_RECONNECT_INTERVAL_MS")? {
            config.connector.reconnect_interval = Duration::from_millis(val);
        }
        if let Some(val) = env_parse::<u64>("STNET_TICK_MS")? {
            config.scheduler.tick = Duration::from_millis(val);
        }
        if let Some(val) = env_parse::<u64>("STNET_RPC_TIMEOUT_MS")? {
            config.rpc.call_timeout = Duration::from_millis(val);
        }
        if let Ok(level) = std::env::var("STNET_LOG_LEVEL") {
            config.logging.log_level = level
                .parse()
                .map_err(|_| ProtocolError::ConfigError(format!("Invalid log level: {level}")))?;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.session.validate());
        errors.extend(self.service.validate());
        errors.extend(self.connector.validate());
        errors.extend(self.scheduler.validate());
        errors.extend(self.rpc.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {key}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Per-session pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial and minimum read buffer size in bytes
    pub read_buffer: usize,

    /// Upper bound for the adaptive read buffer
    pub max_read_buffer: usize,

    /// Chunks queued between the receive and reassembly tasks
    pub recv_queue: usize,

    /// Outbound messages queued before `send` starts waiting
    pub send_queue: usize,

    /// Longest `send` waits for queue space
    #[serde(with = "duration_serde")]
    pub send_timeout: Duration,

    /// Largest unparsed remainder kept between reads
    pub max_pending_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer: DEFAULT_READ_BUFFER,
            max_read_buffer: 64 * 1024,
            recv_queue: 16,
            send_queue: DEFAULT_SEND_QUEUE,
            send_timeout: Duration::from_secs(3),
            max_pending_bytes: MAX_FRAME_SIZE,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.read_buffer < 64 {
            errors.push("Read buffer too small (minimum: 64 bytes)".to_string());
        }
        if self.max_read_buffer < self.read_buffer {
            errors.push("max_read_buffer cannot be smaller than read_buffer".to_string());
        }
        if self.recv_queue == 0 {
            errors.push("Receive queue length must be greater than 0".to_string());
        }
        if self.send_queue == 0 {
            errors.push("Send queue length must be greater than 0".to_string());
        } else if self.send_queue > 1_000_000 {
            errors.push(format!(
                "Send queue too large: {} (max recommended: 1,000,000)",
                self.send_queue
            ));
        }
        if self.send_timeout.as_millis() < 1 {
            errors.push("Send timeout too short (minimum: 1ms)".to_string());
        } else if self.send_timeout.as_secs() > 300 {
            errors.push("Send timeout too long (maximum: 300s)".to_string());
        }
        if self.max_pending_bytes < self.read_buffer {
            errors.push("max_pending_bytes cannot be smaller than read_buffer".to_string());
        }

        errors
    }
}

/// Service / Connect event queue settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Bounded event queue length
    pub queue_len: usize,

    /// Events handled per `loop` call
    pub batch_size: usize,

    /// Largest frame accepted by record-oriented strategies
    pub max_frame_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            queue_len: DEFAULT_SERVICE_QUEUE,
            batch_size: DEFAULT_BATCH_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.queue_len == 0 {
            errors.push("Service queue length must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            errors.push("Batch size must be greater than 0".to_string());
        }
        if self.max_frame_size < 5 {
            errors.push("Max frame size too small (minimum: 5 bytes)".to_string());
        } else if self.max_frame_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_frame_size
            ));
        }

        errors
    }
}

/// Outbound connection settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Delay between reconnect attempts; zero disables retry
    #[serde(with = "duration_serde")]
    pub reconnect_interval: Duration,

    /// Timeout for a single dial
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectorConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.reconnect_interval.as_secs() > 3600 {
            errors.push("Reconnect interval too long (maximum: 1 hour)".to_string());
        }
        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep between drain passes of one shard
    #[serde(with = "duration_serde")]
    pub tick: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.tick.is_zero() {
            errors.push("Scheduler tick must be greater than 0".to_string());
        } else if self.tick.as_secs() > 60 {
            errors.push("Scheduler tick too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// RPC client settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// Deadline window of a pending call
    #[serde(with = "duration_serde")]
    pub call_timeout: Duration,

    /// Reconnect interval of RPC client connectors
    #[serde(with = "duration_serde")]
    pub reconnect_interval: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_millis(100),
        }
    }
}

impl RpcConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.call_timeout.as_millis() < 10 {
            errors.push("RPC call timeout too short (minimum: 10ms)".to_string());
        } else if self.call_timeout.as_secs() > 600 {
            errors.push("RPC call timeout too long (maximum: 600s)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("stnet"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
