//! Pipeline configuration.

use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Name the checkpoints are stored under
    pub name: String,
    /// Maximum events fetched per poll
    pub batch_size: usize,
    /// Contiguous progress that triggers a checkpoint
    pub checkpoint_threshold: u64,
    /// Maximum handlers running at once
    pub workers: usize,
    /// Maximum fetched elements beyond the contiguous frontier
    pub max_in_flight: u64,
    /// Delay between polls when the log has nothing new
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight elements
    pub drain_timeout: Duration,
    /// How long back-pressure may pin the same frontier before it is reported
    pub stall_warning: Duration,
}

impl PipelineConfig {
    /// Default settings under another pipeline name
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Reject settings the pipeline can't run with.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Config("name must not be empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".to_string()));
        }
        if self.checkpoint_threshold == 0 {
            return Err(PipelineError::Config(
                "checkpoint_threshold must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".to_string()));
        }
        if self.max_in_flight < self.batch_size as u64 {
            return Err(PipelineError::Config(format!(
                "max_in_flight ({}) must be at least batch_size ({})",
                self.max_in_flight, self.batch_size
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(PipelineError::Config("poll_interval must be positive".to_string()));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            batch_size: 100,
            checkpoint_threshold: 50,
            workers: 8,
            max_in_flight: 1000,
            poll_interval: Duration::from_millis(200),
            drain_timeout: Duration::from_secs(30),
            stall_warning: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();

        assert_eq!(config.name, "default");
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.checkpoint_threshold, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_named_keeps_defaults() {
        let config = PipelineConfig::named("projections");

        assert_eq!(config.name, "projections");
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let zero_batch = PipelineConfig { batch_size: 0, ..PipelineConfig::default() };
        assert!(matches!(zero_batch.validate(), Err(PipelineError::Config(_))));

        let zero_workers = PipelineConfig { workers: 0, ..PipelineConfig::default() };
        assert!(zero_workers.validate().is_err());

        let tiny_window =
            PipelineConfig { batch_size: 100, max_in_flight: 10, ..PipelineConfig::default() };
        assert!(tiny_window.validate().is_err());

        let blank = PipelineConfig::named("  ");
        assert!(blank.validate().is_err());
    }
}
