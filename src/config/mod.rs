//! # Application Configuration
//!
//! JSON config file plus environment overrides. Every field has a default, so
//! an absent file yields a runnable development configuration.
//!
//! Environment:
//! - `RUN_ENV`: profile (`prod`/`product`, `test`/`testing`, anything else is develop)
//! - `RESTBASE_HOST`, `RESTBASE_PORT`, `RESTBASE_JWT_SECRET`: override the file

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Product,
    Testing,
    #[default]
    Develop,
}

impl Profile {
    /// Map a `RUN_ENV` value to a profile
    pub fn from_run_env(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "product" | "production" => Profile::Product,
            "test" | "testing" => Profile::Testing,
            _ => Profile::Develop,
        }
    }

    /// Log level used when the config names none
    pub fn default_log_level(&self) -> &'static str {
        match self {
            Profile::Develop => "debug",
            Profile::Product | Profile::Testing => "info",
        }
    }
}

/// HTTP listener and routing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 9898)
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allowed origins; `["*"]` or empty allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Prefix for every API route (default: "/api/v1")
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9898
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            api_prefix: default_api_prefix(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether CORS should allow any origin
    pub fn cors_allows_any(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Token signing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    #[serde(default = "default_secret")]
    pub secret: String,

    /// Access token lifetime in seconds (default: 7200)
    #[serde(default = "default_ttl")]
    pub access_token_ttl_secs: i64,

    #[serde(default = "default_issuer")]
    pub issuer: String,
}

fn default_secret() -> String {
    "CHANGE_THIS_SECRET_IN_PRODUCTION".to_string()
}

fn default_ttl() -> i64 {
    7200
}

fn default_issuer() -> String {
    "restbase".to_string()
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            access_token_ttl_secs: default_ttl(),
            issuer: default_issuer(),
        }
    }
}

impl JwtSettings {
    pub fn to_jwt_config(&self) -> crate::auth::JwtConfig {
        crate::auth::JwtConfig {
            secret: self.secret.clone(),
            access_token_ttl: chrono::Duration::seconds(self.access_token_ttl_secs),
            issuer: self.issuer.clone(),
        }
    }
}

/// Background task workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Finished task statuses kept for lookup
    #[serde(default = "default_status_capacity")]
    pub status_capacity: usize,
}

fn default_workers() -> usize {
    2
}

fn default_status_capacity() -> usize {
    crate::tasks::DEFAULT_STATUS_CAPACITY
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            status_capacity: default_status_capacity(),
        }
    }
}

/// Upstream for the streaming demo endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SseSettings {
    #[serde(default)]
    pub upstream_url: Option<String>,

    /// Sent as a bearer token to the upstream when set
    #[serde(default)]
    pub upstream_api_key: Option<String>,
}

/// Logging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    /// Level or filter directive; the profile default applies when unset
    #[serde(default)]
    pub level: Option<String>,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub jwt: JwtSettings,
    #[serde(default)]
    pub tasks: TaskSettings,
    #[serde(default)]
    pub sse: SseSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl AppConfig {
    /// Load from an optional JSON file, apply the process environment, validate
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`AppConfig::load`] with an explicit environment lookup
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                serde_json::from_str(&content)?
            }
            None => AppConfig::default(),
        };

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(run_env) = env("RUN_ENV") {
            self.profile = Profile::from_run_env(&run_env);
        }
        if let Some(host) = env("RESTBASE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env("RESTBASE_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "RESTBASE_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(secret) = env("RESTBASE_JWT_SECRET") {
            self.jwt.secret = secret;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt.secret must not be empty".into()));
        }
        if self.profile == Profile::Product && self.jwt.secret == default_secret() {
            return Err(ConfigError::Invalid(
                "jwt.secret must be set for the product profile".into(),
            ));
        }
        if self.jwt.access_token_ttl_secs <= 0 {
            return Err(ConfigError::Invalid(
                "jwt.access_token_ttl_secs must be positive".into(),
            ));
        }
        if self.tasks.workers == 0 {
            return Err(ConfigError::Invalid("tasks.workers must be at least 1".into()));
        }
        if !self.server.api_prefix.is_empty() && !self.server.api_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(
                "server.api_prefix must start with '/'".into(),
            ));
        }
        Ok(())
    }

    /// Effective log filter
    pub fn log_level(&self) -> String {
        self.log
            .level
            .clone()
            .unwrap_or_else(|| self.profile.default_log_level().to_string())
    }
}
