//! Sequence counters and pipeline checkpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EventId;

/// A named monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    /// Counter name
    pub name: String,
    /// Last value handed out
    pub value: u64,
}

/// Durable marker of the last event a named pipeline has processed.
///
/// Rows are append-only; the current checkpoint of a pipeline is the row
/// with the greatest `insertion_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    /// Pipeline name
    pub pipeline_name: String,
    /// Last event processed by the pipeline
    pub last_processed_event_id: EventId,
    /// Monotonic insertion order
    pub insertion_order: u64,
    /// When the row was written
    pub created_at: DateTime<Utc>,
}

impl PipelineCheckpoint {
    /// Create a checkpoint row
    pub fn new(
        pipeline_name: impl Into<String>,
        last_processed_event_id: EventId,
        insertion_order: u64,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            last_processed_event_id,
            insertion_order,
            created_at: Utc::now(),
        }
    }
}
