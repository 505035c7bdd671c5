use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::domain::TelemetryError;
use crate::infrastructure::observability::TelemetryConfig;

/// Application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    /// Explicit log level override
    #[serde(default)]
    pub log_level: Option<LogLevel>,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Error reporting DSN, honoured outside the local environment only
    #[serde(default)]
    pub error_reporting_dsn: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    /// Database whose pool is sampled and whose queries are traced
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Connection pool settings for the monitored database
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

/// Deployment environment class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn is_local(&self) -> bool {
        *self == Environment::Local
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log verbosity accepted by the `log_level` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            other => Err(TelemetryError::configuration(format!(
                "unknown log level '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = TelemetryError;

    fn try_from(value: String) -> Result<Self, TelemetryError> {
        value.parse()
    }
}

fn default_api_prefix() -> String {
    "/api/v1".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            log_level: None,
            api_prefix: default_api_prefix(),
            telemetry: TelemetryConfig::default(),
            error_reporting_dsn: None,
            server: ServerConfig::default(),
            database: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Settings {
    /// Loads settings from `config/` files and `APP__*` environment variables.
    ///
    /// Invalid values fail here rather than at first use.
    pub fn load() -> Result<Self, TelemetryError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self, TelemetryError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        self.telemetry.validate()
    }

    /// Explicit override, else debug for local and warning everywhere else
    pub fn effective_log_level(&self) -> LogLevel {
        match self.log_level {
            Some(level) => level,
            None if self.environment.is_local() => LogLevel::Debug,
            None => LogLevel::Warning,
        }
    }

    /// Route excluded from request metrics
    pub fn health_check_path(&self) -> String {
        format!("{}/utils/health-check/", self.api_prefix.trim_end_matches('/'))
    }

    pub fn error_reporting_dsn(&self) -> Option<&str> {
        if self.environment.is_local() {
            return None;
        }

        self.error_reporting_dsn.as_deref().filter(|dsn| !dsn.is_empty())
    }
}
