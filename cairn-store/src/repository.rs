//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the event log and the
//! pipeline. Implementations can be PostgreSQL, in-memory, or a wrapper
//! injecting faults for testing.

use crate::error::StoreError;
use async_trait::async_trait;
use cairn_domain::{EventId, EventRecord, PipelineCheckpoint, Snapshot, StreamHead, StreamId};

/// Repository for committed events (append-only)
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Commit events at the positions that follow the counter `sequence`.
    ///
    /// `records` carry consecutive `global_seq` values starting at the
    /// counter's value + 1 (a missing counter counts as 0). Advancing the
    /// counter and inserting the records is one atomic step, so positions
    /// become visible in the order they were claimed.
    ///
    /// Returns `false`, writing nothing, when the counter has moved past
    /// `records[0].global_seq - 1`. Fails with `Duplicate`, writing nothing,
    /// if a stream position or event id is already taken.
    async fn commit_events(
        &self,
        sequence: &str,
        records: &[EventRecord],
    ) -> Result<bool, StoreError>;

    /// Events of one stream with `min_seq <= stream_seq <= max_seq`, ordered by `stream_seq`
    async fn find_by_stream(
        &self,
        stream_id: StreamId,
        min_seq: u64,
        max_seq: u64,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Up to `limit` events with `global_seq` strictly greater than `after`, ascending.
    /// `None` starts from the beginning of the log.
    async fn find_after(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError>;

    /// Global position of an event, if it exists
    async fn find_global_seq(&self, event_id: EventId) -> Result<Option<u64>, StoreError>;
}

/// Repository for stream heads
#[async_trait]
pub trait StreamRepository: Send + Sync {
    /// Find the head of a stream
    async fn find_head(&self, stream_id: StreamId) -> Result<Option<StreamHead>, StoreError>;

    /// Insert a head if none exists for the stream.
    ///
    /// Returns `false` when another writer created the head first.
    async fn insert_head(&self, head: &StreamHead) -> Result<bool, StoreError>;

    /// Set `current_version` to `new_version` only if it still equals `expected_version`.
    ///
    /// Returns `false` when the condition did not hold (another writer won).
    async fn compare_and_set_version(
        &self,
        stream_id: StreamId,
        expected_version: u64,
        new_version: u64,
    ) -> Result<bool, StoreError>;
}

/// Repository for snapshots (append-only)
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Append a snapshot row
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Newest snapshot of the stream with `version <= max_version`
    async fn find_snapshot(
        &self,
        stream_id: StreamId,
        max_version: u64,
    ) -> Result<Option<Snapshot>, StoreError>;
}

/// Repository for named counters
#[async_trait]
pub trait SequenceRepository: Send + Sync {
    /// Current value of a counter
    async fn find_counter(&self, name: &str) -> Result<Option<u64>, StoreError>;

    /// Create a counter if it doesn't exist.
    ///
    /// Returns `false` when the counter already exists.
    async fn insert_counter(&self, name: &str, value: u64) -> Result<bool, StoreError>;

    /// Set the counter to `new_value` only if it still equals `expected_value`.
    ///
    /// Returns `false` when the condition did not hold.
    async fn compare_and_set_counter(
        &self,
        name: &str,
        expected_value: u64,
        new_value: u64,
    ) -> Result<bool, StoreError>;
}

/// Repository for pipeline checkpoints (append-only)
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    /// Append a checkpoint row
    async fn insert_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<(), StoreError>;

    /// Row with the greatest insertion order for the pipeline
    async fn find_latest_checkpoint(
        &self,
        pipeline_name: &str,
    ) -> Result<Option<PipelineCheckpoint>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get event repository
    fn events(&self) -> &dyn EventRepository;

    /// Get stream head repository
    fn streams(&self) -> &dyn StreamRepository;

    /// Get snapshot repository
    fn snapshots(&self) -> &dyn SnapshotRepository;

    /// Get sequence counter repository
    fn sequences(&self) -> &dyn SequenceRepository;

    /// Get checkpoint repository
    fn checkpoints(&self) -> &dyn CheckpointRepository;
}
