//! Process configuration for the daemon.
//!
//! The binary collects command line options into a [`DaemonConfig`];
//! everything the daemon needs at startup is validated here so a bad
//! value fails before any socket is opened.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::logging::LogLevel;

/// Default control socket host.
pub const DEFAULT_SOCKET_HOST: &str = "localhost";

/// Default control socket port.
pub const DEFAULT_SOCKET_PORT: u16 = 55009;

/// Default PID file location.
pub const DEFAULT_PID_FILE: &str = "/tmp/vtod.pid";

/// Default daemon name used in log lines.
pub const DEFAULT_DAEMON_NAME: &str = "vtod";

/// Default interval between notification flushes.
pub const DEFAULT_CYCLE: Duration = Duration::from_millis(300);

/// Validated daemon configuration.
#[derive(Clone)]
pub struct DaemonConfig {
    /// Log verbosity
    pub log_level: LogLevel,

    /// PID marker file
    pub pid_file: PathBuf,

    /// Notification backend URL (None = log only)
    pub callback: Option<Url>,

    /// Shared secret for the control channel and the backend
    pub apikey: String,

    /// Control socket bind host
    pub socket_host: String,

    /// Control socket bind port
    pub socket_port: u16,

    /// Name used in log lines
    pub daemon_name: String,

    /// Interval between batched notification flushes (zero = immediate)
    pub cycle: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Error,
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            callback: None,
            apikey: String::new(),
            socket_host: DEFAULT_SOCKET_HOST.to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
            daemon_name: DEFAULT_DAEMON_NAME.to_string(),
            cycle: DEFAULT_CYCLE,
        }
    }
}

impl DaemonConfig {
    /// Returns `host:port` for the control socket.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.socket_host, self.socket_port)
    }

    /// Parses and sets the notification backend URL.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidCallback` if the URL does not parse or is not
    /// http(s).
    pub fn with_callback(mut self, callback: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(callback).map_err(|e| ConfigError::InvalidCallback {
            value: callback.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidCallback {
                value: callback.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        self.callback = Some(url);
        Ok(self)
    }

    /// Sets the flush cycle from a number of seconds.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidCycle` for negative or non-finite values.
    pub fn with_cycle_secs(mut self, secs: f64) -> Result<Self, ConfigError> {
        self.cycle =
            Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidCycle(secs))?;
        Ok(self)
    }

    /// Sets the log level from its textual name.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidLogLevel` for an unknown name.
    pub fn with_log_level(mut self, level: &str) -> Result<Self, ConfigError> {
        self.log_level = level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(level.to_string()))?;
        Ok(self)
    }
}

// The apikey is a secret; keep it out of debug output.
impl fmt::Debug for DaemonConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonConfig")
            .field("log_level", &self.log_level)
            .field("pid_file", &self.pid_file)
            .field("callback", &self.callback.as_ref().map(Url::as_str))
            .field("apikey", &"<redacted>")
            .field("socket_host", &self.socket_host)
            .field("socket_port", &self.socket_port)
            .field("daemon_name", &self.daemon_name)
            .field("cycle", &self.cycle)
            .finish()
    }
}

/// Errors in startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid callback URL '{value}': {reason}")]
    InvalidCallback { value: String, reason: String },

    #[error("Invalid cycle: {0} (expected a non-negative number of seconds)")]
    InvalidCycle(f64),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}
