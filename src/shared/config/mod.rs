//! Application configuration module
//!
//! Provides the configuration types for the synchronization engine, a builder
//! in the usual style, and loading from a TOML file.
//!
//! ```toml
//! server_url = "https://relief.example.org"
//! api_prefix = "/api"
//! events_path = "/events"
//! request_timeout_secs = 10
//! drain_interval_secs = 60
//!
//! [reconnect]
//! strategy = "exponential"
//! base_ms = 1000
//! max_ms = 30000
//! max_attempts = 20
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::offline::retry::{BackoffStrategy, RetryPolicy};

/// Default API prefix appended to the server URL
pub const DEFAULT_API_PREFIX: &str = "/api";

/// Default path of the event stream
pub const DEFAULT_EVENTS_PATH: &str = "/events";

/// Default timeout for a single remote call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server URL
    pub server_url: Option<String>,
    /// Path prefix of the REST API
    pub api_prefix: String,
    /// Absolute URL or server-relative path of the event stream
    pub events_path: String,
    /// Location of the local database, `None` for the platform default
    pub database_path: Option<PathBuf>,
    /// Bearer token issued by the authentication service
    pub auth_token: Option<String>,
    /// Timeout applied to each remote call
    pub request_timeout: Duration,
    /// Reconnect policy of the event channel
    pub reconnect: RetryPolicy,
    /// Periodic drain while online with pending mutations
    pub drain_interval: Option<Duration>,
    /// Interval of the reachability probe used by the agent binary
    pub probe_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            events_path: DEFAULT_EVENTS_PATH.to_string(),
            database_path: None,
            auth_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: RetryPolicy::default(),
            drain_interval: None,
            probe_interval: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Read a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse a TOML configuration document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.into_builder().build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.server_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl(url.clone()));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.probe_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "probe_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    server_url: Option<String>,
    api_prefix: Option<String>,
    events_path: Option<String>,
    database_path: Option<PathBuf>,
    auth_token: Option<String>,
    request_timeout: Option<Duration>,
    reconnect: Option<RetryPolicy>,
    drain_interval: Option<Duration>,
    probe_interval: Option<Duration>,
}

impl AppConfigBuilder {
    /// Set the server URL
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    /// Set the REST API prefix
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = Some(prefix.into());
        self
    }

    /// Set the event stream path or URL
    pub fn events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    /// Set the local database location
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set the bearer token
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Set the per-call timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the event channel reconnect policy
    pub fn reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Enable the periodic drain
    pub fn drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = Some(interval);
        self
    }

    /// Set the reachability probe interval
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = Some(interval);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            server_url: self.server_url.map(|url| url.trim_end_matches('/').to_string()),
            api_prefix: self.api_prefix.unwrap_or(defaults.api_prefix),
            events_path: self.events_path.unwrap_or(defaults.events_path),
            database_path: self.database_path,
            auth_token: self.auth_token,
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            reconnect: self.reconnect.unwrap_or(defaults.reconnect),
            drain_interval: self.drain_interval,
            probe_interval: self.probe_interval.unwrap_or(defaults.probe_interval),
        };
        config.validate()?;
        Ok(config)
    }
}

/// On-disk representation of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    server_url: Option<String>,
    api_prefix: Option<String>,
    events_path: Option<String>,
    database_path: Option<PathBuf>,
    auth_token: Option<String>,
    request_timeout_secs: Option<u64>,
    drain_interval_secs: Option<u64>,
    probe_interval_secs: Option<u64>,
    reconnect: Option<ReconnectFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReconnectFile {
    strategy: ReconnectStrategyFile,
    base_ms: u64,
    #[serde(default)]
    max_ms: Option<u64>,
    #[serde(default)]
    max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReconnectStrategyFile {
    Fixed,
    Linear,
    Exponential,
}

impl ReconnectFile {
    fn into_policy(self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_ms);
        let max = self.max_ms.map(Duration::from_millis);
        let strategy = match self.strategy {
            ReconnectStrategyFile::Fixed => BackoffStrategy::Fixed { interval: base },
            ReconnectStrategyFile::Linear => BackoffStrategy::Linear {
                step: base,
                max: max.unwrap_or(base * 30),
            },
            ReconnectStrategyFile::Exponential => BackoffStrategy::Exponential {
                base,
                max: max.unwrap_or(base * 30),
            },
        };
        RetryPolicy {
            strategy,
            max_attempts: self.max_attempts,
        }
    }
}

impl ConfigFile {
    fn into_builder(self) -> AppConfigBuilder {
        AppConfigBuilder {
            server_url: self.server_url,
            api_prefix: self.api_prefix,
            events_path: self.events_path,
            database_path: self.database_path,
            auth_token: self.auth_token,
            request_timeout: self.request_timeout_secs.map(Duration::from_secs),
            reconnect: self.reconnect.map(ReconnectFile::into_policy),
            drain_interval: self.drain_interval_secs.map(Duration::from_secs),
            probe_interval: self.probe_interval_secs.map(Duration::from_secs),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error("cannot parse configuration: {0}")]
    Parse(String),
}
