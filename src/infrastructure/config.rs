//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML/JSON/YAML file, then `CATALOG_RECONCILER_*` environment
//! variables (`__` separates nested keys, e.g.
//! `CATALOG_RECONCILER_RECONCILIATION__MAX_ATTEMPTS=12`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::application::products_controller::ControllerSettings;
use crate::application::reconciliation::PollPolicy;
use crate::domain::MatchPolicy;

pub const ENV_PREFIX: &str = "CATALOG_RECONCILER";
pub const APP_DIR_NAME: &str = "catalog-reconciler";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub reconciliation: ReconciliationConfig,
    pub pagination: PaginationConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Products backend connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; `/api/...` paths are joined onto it
    pub base_url: String,

    pub request_timeout_ms: u64,

    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_ms: 10_000,
            user_agent: format!("{}/{}", APP_DIR_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Poll cadence, budget and match tolerance after a queued mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub poll_interval_ms: u64,

    /// Total list queries per session, the immediate first one included
    pub max_attempts: u32,

    /// Absolute price difference still counted as a match
    pub price_tolerance: f64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            poll_interval_ms: u64::try_from(policy.interval.as_millis()).unwrap_or(800),
            max_attempts: policy.max_attempts,
            price_tolerance: policy.match_policy.price_tolerance,
        }
    }
}

impl From<&ReconciliationConfig> for PollPolicy {
    fn from(config: &ReconciliationConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_attempts,
            match_policy: MatchPolicy {
                price_tolerance: config.price_tolerance,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub default_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

/// Token storage and auth redirects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token file; defaults to `<config dir>/catalog-reconciler/token`
    pub token_file: Option<PathBuf>,

    pub login_route: String,

    /// Where the login surface sends the user back to
    pub return_route: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_file: None,
            login_route: "/login".to_string(),
            return_route: "/products".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn token_path(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("token"))
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Directory for rolling log files; defaults to `<data dir>/catalog-reconciler/logs`
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files are deleted on startup)
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: None,
            max_files: 7,
            module_filters: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn log_directory(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join("logs")
        })
    }
}

impl AppConfig {
    /// Load defaults, then `path` (required when given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_environment(path, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_environment(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!("📄 Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder.add_source(environment).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Default location for a user config file
    pub fn default_config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = url::Url::parse(&self.api.base_url).map_err(|e| ConfigError::Validation {
            message: format!("api.base_url '{}' is not a valid URL: {}", self.api.base_url, e),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                message: format!("api.base_url must use http or https, got '{}'", base_url.scheme()),
            });
        }

        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                message: "api.request_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.reconciliation.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "reconciliation.max_attempts must be greater than 0".to_string(),
            });
        }

        if self.reconciliation.poll_interval_ms == 0 {
            return Err(ConfigError::Validation {
                message: "reconciliation.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if !self.reconciliation.price_tolerance.is_finite() || self.reconciliation.price_tolerance <= 0.0 {
            return Err(ConfigError::Validation {
                message: "reconciliation.price_tolerance must be a positive number".to_string(),
            });
        }

        if self.pagination.default_limit == 0 {
            return Err(ConfigError::Validation {
                message: "pagination.default_limit must be greater than 0".to_string(),
            });
        }

        if !self.session.login_route.starts_with('/') || !self.session.return_route.starts_with('/') {
            return Err(ConfigError::Validation {
                message: "session routes must be absolute paths".to_string(),
            });
        }

        if !self.logging.console_output && !self.logging.file_output {
            return Err(ConfigError::Validation {
                message: "logging needs console_output or file_output enabled".to_string(),
            });
        }

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from(&self.reconciliation)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            default_limit: self.pagination.default_limit,
            login_route: self.session.login_route.clone(),
            return_route: self.session.return_route.clone(),
        }
    }
}
