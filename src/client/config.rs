use std::path::PathBuf;

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Client configuration wrapper.
///
/// Adds environment overrides and URL helpers on top of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    app: AppConfig,
    token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let app = Self::apply_env(AppConfig::builder())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring invalid environment configuration");
                AppConfig::default()
            });
        let token = app.auth_token.clone();
        Self { app, token }
    }
}

impl Config {
    /// Create a new configuration from defaults and the environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit builder, without environment overrides
    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        let token = app.auth_token.clone();
        Ok(Self { app, token })
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let mut app = AppConfig::from_toml_file(path)?;
        Self::override_from_env(&mut app);
        app.validate()?;
        let token = app.auth_token.clone();
        Ok(Self { app, token })
    }

    fn apply_env(mut builder: AppConfigBuilder) -> AppConfigBuilder {
        if let Ok(url) = std::env::var("CLIENT_API_URL") {
            builder = builder.server_url(url);
        }
        if let Ok(events) = std::env::var("RELIEF_SYNC_EVENTS_URL") {
            builder = builder.events_path(events);
        }
        if let Ok(path) = std::env::var("RELIEF_SYNC_DB_PATH") {
            builder = builder.database_path(path);
        }
        if let Ok(token) = std::env::var("RELIEF_SYNC_TOKEN") {
            builder = builder.auth_token(token);
        }
        builder
    }

    fn override_from_env(app: &mut AppConfig) {
        if let Ok(url) = std::env::var("CLIENT_API_URL") {
            app.server_url = Some(url.trim_end_matches('/').to_string());
        }
        if let Ok(events) = std::env::var("RELIEF_SYNC_EVENTS_URL") {
            app.events_path = events;
        }
        if let Ok(path) = std::env::var("RELIEF_SYNC_DB_PATH") {
            app.database_path = Some(PathBuf::from(path));
        }
        if let Ok(token) = std::env::var("RELIEF_SYNC_TOKEN") {
            app.auth_token = Some(token);
        }
    }

    /// Underlying application configuration
    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    /// Set the bearer token
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Get the bearer token
    pub fn get_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Clear the token (logout)
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.server_url(), self.app.api_prefix, path)
    }

    /// Full URL of the event stream
    pub fn events_url(&self) -> String {
        let events = &self.app.events_path;
        if events.starts_with("http://") || events.starts_with("https://") {
            events.clone()
        } else {
            format!("{}{}", self.server_url(), events)
        }
    }

    /// Location of the local database
    pub fn database_path(&self) -> Option<&std::path::Path> {
        self.app.database_path.as_deref()
    }
}
