//! Checkpoint Store
//!
//! Persists, per named pipeline, the last event processed. Rows are never
//! overwritten; each one gets its insertion order from the `pipeline`
//! sequence and the newest row wins.

use std::sync::Arc;

use cairn_domain::{EventId, PipelineCheckpoint};
use cairn_eventlog::{SequenceAllocator, PIPELINE_SEQUENCE};
use cairn_store::Store;
use tracing::debug;

use crate::error::Result;

pub struct CheckpointStore<S: Store + ?Sized> {
    store: Arc<S>,
    sequences: SequenceAllocator<S>,
}

impl<S: Store + ?Sized> Clone for CheckpointStore<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), sequences: self.sequences.clone() }
    }
}

impl<S: Store + ?Sized> CheckpointStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        let sequences = SequenceAllocator::new(store.clone());
        Self { store, sequences }
    }

    /// Last event the pipeline checkpointed, `None` if it never did
    pub async fn get_last(&self, pipeline_name: &str) -> Result<Option<EventId>> {
        let latest = self.store.checkpoints().find_latest_checkpoint(pipeline_name).await?;
        Ok(latest.map(|c| c.last_processed_event_id))
    }

    /// Record `event_id` as the pipeline's last processed event
    pub async fn mark_processed(&self, pipeline_name: &str, event_id: EventId) -> Result<()> {
        let insertion_order = self.sequences.next(PIPELINE_SEQUENCE).await?;
        let checkpoint = PipelineCheckpoint::new(pipeline_name, event_id, insertion_order);
        self.store.checkpoints().insert_checkpoint(&checkpoint).await?;

        debug!(
            pipeline = pipeline_name,
            event_id = %event_id,
            insertion_order,
            "Checkpoint stored"
        );
        Ok(())
    }
}
