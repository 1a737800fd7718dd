//! Client configuration.
//!
//! Values come from environment variables, falling back to defaults that match
//! a locally running generation backend.
//!
//! - `WORKBENCH_API_BASE` - base URL of the generation backend
//! - `WORKBENCH_POLL_INTERVAL_MS` - status poll interval in milliseconds
//! - `WORKBENCH_STREAM_LOGS` - `false`/`0` disables the log stream channel
//! - `WORKBENCH_REQUEST_TIMEOUT_SECS` - per-request HTTP timeout

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1600);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API base URL '{value}': {source}")]
    InvalidApiBase {
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL, without trailing slash.
    pub api_base: String,
    /// Interval between two status queries of one task.
    pub poll_interval: Duration,
    /// Whether tasks subscribe to the server's log stream.
    pub stream_logs: bool,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stream_logs: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    /// Build a config from the environment, using defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("WORKBENCH_API_BASE") {
            config = config.with_api_base(base)?;
        }
        if let Ok(raw) = std::env::var("WORKBENCH_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_positive(
                "WORKBENCH_POLL_INTERVAL_MS",
                &raw,
            )?);
        }
        if let Ok(raw) = std::env::var("WORKBENCH_STREAM_LOGS") {
            config.stream_logs = parse_flag("WORKBENCH_STREAM_LOGS", &raw)?;
        }
        if let Ok(raw) = std::env::var("WORKBENCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_positive(
                "WORKBENCH_REQUEST_TIMEOUT_SECS",
                &raw,
            )?);
        }

        tracing::debug!(
            api_base = %config.api_base,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            stream_logs = config.stream_logs,
            "Loaded client configuration"
        );
        Ok(config)
    }

    /// Replace the API base after validating it as an absolute URL.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Result<Self, ConfigError> {
        let mut base = base.into();
        Url::parse(&base).map_err(|source| ConfigError::InvalidApiBase {
            value: base.clone(),
            source,
        })?;
        while base.ends_with('/') {
            base.pop();
        }
        self.api_base = base;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
