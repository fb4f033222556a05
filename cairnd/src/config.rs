//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use cairn_pipeline::PipelineConfig;

use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pipeline configuration
    pub pipeline: PipelineConfig,

    /// Log output format
    pub log_format: LogFormat,

    /// PostgreSQL connection string (in-memory store when absent)
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            pipeline: PipelineConfig {
                poll_interval: Duration::from_millis(10),
                drain_timeout: Duration::from_secs(5),
                ..PipelineConfig::named("test")
            },
            log_format: LogFormat::Pretty,
            database_url: None,
            environment: Environment::Test,
        }
    }

    /// Build configuration from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> DaemonResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = Self::load_environment(&lookup)?;
        let pipeline = Self::load_pipeline_config(&lookup)?;
        let log_format = Self::load_log_format(&lookup)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self { pipeline, log_format, database_url, environment })
    }

    fn load_environment(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<Environment> {
        let env_str = lookup("CAIRN_ENV").unwrap_or_else(|| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid CAIRN_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_log_format(lookup: &impl Fn(&str) -> Option<String>) -> DaemonResult<LogFormat> {
        match lookup("CAIRN_LOG_FORMAT").map(|v| v.to_lowercase()).as_deref() {
            None | Some("pretty") | Some("text") => Ok(LogFormat::Pretty),
            Some("json") => Ok(LogFormat::Json),
            Some(other) => Err(DaemonError::Config(format!(
                "Invalid CAIRN_LOG_FORMAT: {}. Expected: pretty, json",
                other
            ))),
        }
    }

    fn load_pipeline_config(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> DaemonResult<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let pipeline = PipelineConfig {
            name: lookup("CAIRN_PIPELINE_NAME").unwrap_or(defaults.name),
            batch_size: Self::load_parsed(lookup, "CAIRN_BATCH_SIZE", defaults.batch_size)?,
            checkpoint_threshold: Self::load_parsed(
                lookup,
                "CAIRN_CHECKPOINT_THRESHOLD",
                defaults.checkpoint_threshold,
            )?,
            workers: Self::load_parsed(lookup, "CAIRN_WORKERS", defaults.workers)?,
            max_in_flight: Self::load_parsed(lookup, "CAIRN_MAX_IN_FLIGHT", defaults.max_in_flight)?,
            poll_interval: Duration::from_millis(Self::load_parsed(
                lookup,
                "CAIRN_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            drain_timeout: Duration::from_millis(Self::load_parsed(
                lookup,
                "CAIRN_DRAIN_TIMEOUT_MS",
                defaults.drain_timeout.as_millis() as u64,
            )?),
            stall_warning: Duration::from_millis(Self::load_parsed(
                lookup,
                "CAIRN_STALL_WARNING_MS",
                defaults.stall_warning.as_millis() as u64,
            )?),
        };

        pipeline.validate().map_err(|e| DaemonError::Config(e.to_string()))?;
        Ok(pipeline)
    }

    fn load_parsed<T: FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
        default: T,
    ) -> DaemonResult<T> {
        match lookup(key) {
            Some(val) => val
                .trim()
                .parse::<T>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            None => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            log_format: LogFormat::Pretty,
            database_url: None,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> DaemonResult<Config> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.pipeline.name, "default");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_test_config() {
        let config = Config::test();

        assert_eq!(config.environment, Environment::Test);
        assert!(config.pipeline.validate().is_ok());
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CAIRN_ENV", "prod"),
            ("CAIRN_PIPELINE_NAME", "projections"),
            ("CAIRN_BATCH_SIZE", "250"),
            ("CAIRN_CHECKPOINT_THRESHOLD", "10"),
            ("CAIRN_WORKERS", "2"),
            ("CAIRN_MAX_IN_FLIGHT", "5000"),
            ("CAIRN_POLL_INTERVAL_MS", "50"),
            ("CAIRN_DRAIN_TIMEOUT_MS", "1500"),
            ("CAIRN_STALL_WARNING_MS", "60000"),
            ("CAIRN_LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/cairn"),
        ])
        .unwrap();

        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.pipeline.name, "projections");
        assert_eq!(config.pipeline.batch_size, 250);
        assert_eq!(config.pipeline.checkpoint_threshold, 10);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.max_in_flight, 5000);
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(50));
        assert_eq!(config.pipeline.drain_timeout, Duration::from_millis(1500));
        assert_eq!(config.pipeline.stall_warning, Duration::from_secs(60));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cairn"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(load(&[("CAIRN_ENV", "staging")]), Err(DaemonError::Config(_))));
        assert!(matches!(load(&[("CAIRN_WORKERS", "many")]), Err(DaemonError::Config(_))));
        assert!(matches!(load(&[("CAIRN_LOG_FORMAT", "xml")]), Err(DaemonError::Config(_))));
        assert!(matches!(load(&[("CAIRN_BATCH_SIZE", "0")]), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Test.to_string(), "test");
        assert_eq!(Environment::Production.to_string(), "production");
    }
}
