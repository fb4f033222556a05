//! Daemon error types.

use cairn_eventlog::EventLogError;
use cairn_pipeline::PipelineError;
use cairn_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Event log error
    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
