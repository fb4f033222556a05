//! Event Log Types

use cairn_domain::{EventRecord, StreamId};
use cairn_store::StoreError;

/// Event log errors
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// Another writer advanced the stream first. Reload and retry.
    #[error("Concurrency conflict on stream {stream_id}: could not advance to version {attempted_version}")]
    Concurrency { stream_id: StreamId, attempted_version: u64 },

    /// Malformed append, rejected before touching the store
    #[error("Invalid event: {0}")]
    Validation(String),

    /// Storage fault (unreachable, timed out, rejected)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Typed snapshot could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventLogError {
    /// True for optimistic concurrency conflicts
    pub fn is_concurrency(&self) -> bool {
        matches!(self, EventLogError::Concurrency { .. })
    }

    pub(crate) fn conflict(stream_id: StreamId, attempted_version: u64) -> Self {
        EventLogError::Concurrency { stream_id, attempted_version }
    }
}

pub type Result<T> = std::result::Result<T, EventLogError>;

/// Outcome of appending one stream's share of a multi-stream batch
#[derive(Debug)]
pub struct StreamAppendResult {
    pub stream_id: StreamId,
    pub result: Result<Vec<EventRecord>>,
}

impl StreamAppendResult {
    /// True when the stream's events were committed
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
