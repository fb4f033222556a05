//! Pipeline errors

use cairn_eventlog::EventLogError;
use cairn_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(String),

    #[error("Event log error: {0}")]
    EventLog(#[from] EventLogError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
