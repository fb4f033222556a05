//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access; every conditional write
//! checks and mutates under a single write guard.

use crate::error::StoreError;
use crate::repository::{
    CheckpointRepository, EventRepository, SequenceRepository, SnapshotRepository, Store,
    StreamRepository,
};
use async_trait::async_trait;
use cairn_domain::{EventId, EventRecord, PipelineCheckpoint, Snapshot, StreamHead, StreamId};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory store for testing
pub struct MemoryStore {
    events: RwLock<EventTable>,
    heads: RwLock<HashMap<StreamId, StreamHead>>,
    snapshots: RwLock<HashMap<StreamId, Vec<Snapshot>>>,
    sequences: RwLock<HashMap<String, u64>>,
    checkpoints: RwLock<Vec<PipelineCheckpoint>>,
}

/// Events with the two secondary indexes the repositories need
#[derive(Default)]
struct EventTable {
    by_global: BTreeMap<u64, EventRecord>,
    by_stream: HashMap<StreamId, BTreeMap<u64, u64>>,
    by_event_id: HashMap<EventId, u64>,
}

impl EventTable {
    fn insert(&mut self, record: &EventRecord) -> Result<(), StoreError> {
        if self.by_global.contains_key(&record.global_seq) {
            return Err(StoreError::duplicate("event (global_seq)", record.global_seq));
        }
        if self.by_event_id.contains_key(&record.event_id) {
            return Err(StoreError::duplicate("event", record.event_id));
        }
        let stream = self.by_stream.entry(record.stream_id).or_default();
        if stream.contains_key(&record.stream_seq) {
            return Err(StoreError::duplicate(
                "event (stream_seq)",
                format!("{}@{}", record.stream_id, record.stream_seq),
            ));
        }

        stream.insert(record.stream_seq, record.global_seq);
        self.by_event_id.insert(record.event_id, record.global_seq);
        self.by_global.insert(record.global_seq, record.clone());
        Ok(())
    }

    /// Undo an `insert` of the same record
    fn remove(&mut self, record: &EventRecord) {
        if let Some(stream) = self.by_stream.get_mut(&record.stream_id) {
            stream.remove(&record.stream_seq);
        }
        self.by_event_id.remove(&record.event_id);
        self.by_global.remove(&record.global_seq);
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(EventTable::default()),
            heads: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            sequences: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(Vec::new()),
        }
    }

    /// Get the number of stored events
    pub fn event_count(&self) -> usize {
        self.events.read().map(|t| t.by_global.len()).unwrap_or(0)
    }

    /// Get the number of checkpoint rows
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) -> Result<(), StoreError> {
        *write(&self.events)? = EventTable::default();
        write(&self.heads)?.clear();
        write(&self.snapshots)?.clear();
        write(&self.sequences)?.clear();
        write(&self.checkpoints)?.clear();
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Event Repository Implementation
// =============================================================================

#[async_trait]
impl EventRepository for MemoryStore {
    async fn commit_events(
        &self,
        sequence: &str,
        records: &[EventRecord],
    ) -> Result<bool, StoreError> {
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Ok(true);
        };
        let expected = first
            .global_seq
            .checked_sub(1)
            .ok_or_else(|| StoreError::out_of_range("global_seq", first.global_seq))?;

        // Counter first, then events; the only place holding both
        let mut sequences = write(&self.sequences)?;
        let mut table = write(&self.events)?;

        if sequences.get(sequence).copied().unwrap_or(0) != expected {
            return Ok(false);
        }

        for (index, record) in records.iter().enumerate() {
            if let Err(err) = table.insert(record) {
                for inserted in &records[..index] {
                    table.remove(inserted);
                }
                return Err(err);
            }
        }

        sequences.insert(sequence.to_string(), last.global_seq);
        Ok(true)
    }

    async fn find_by_stream(
        &self,
        stream_id: StreamId,
        min_seq: u64,
        max_seq: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        if min_seq > max_seq {
            return Ok(Vec::new());
        }

        let table = read(&self.events)?;
        let Some(stream) = table.by_stream.get(&stream_id) else {
            return Ok(Vec::new());
        };

        Ok(stream
            .range(min_seq..=max_seq)
            .filter_map(|(_, global_seq)| table.by_global.get(global_seq))
            .cloned()
            .collect())
    }

    async fn find_after(
        &self,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let table = read(&self.events)?;
        let lower = match after {
            Some(seq) => Bound::Excluded(seq),
            None => Bound::Unbounded,
        };

        Ok(table
            .by_global
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn find_global_seq(&self, event_id: EventId) -> Result<Option<u64>, StoreError> {
        let table = read(&self.events)?;
        Ok(table.by_event_id.get(&event_id).copied())
    }
}

// =============================================================================
// Stream Repository Implementation
// =============================================================================

#[async_trait]
impl StreamRepository for MemoryStore {
    async fn find_head(&self, stream_id: StreamId) -> Result<Option<StreamHead>, StoreError> {
        let heads = read(&self.heads)?;
        Ok(heads.get(&stream_id).cloned())
    }

    async fn insert_head(&self, head: &StreamHead) -> Result<bool, StoreError> {
        let mut heads = write(&self.heads)?;
        if heads.contains_key(&head.stream_id) {
            return Ok(false);
        }
        heads.insert(head.stream_id, head.clone());
        Ok(true)
    }

    async fn compare_and_set_version(
        &self,
        stream_id: StreamId,
        expected_version: u64,
        new_version: u64,
    ) -> Result<bool, StoreError> {
        let mut heads = write(&self.heads)?;
        match heads.get_mut(&stream_id) {
            Some(head) if head.current_version == expected_version => {
                head.current_version = new_version;
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Snapshot Repository Implementation
// =============================================================================

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut snapshots = write(&self.snapshots)?;
        snapshots.entry(snapshot.stream_id).or_default().push(snapshot.clone());
        Ok(())
    }

    async fn find_snapshot(
        &self,
        stream_id: StreamId,
        max_version: u64,
    ) -> Result<Option<Snapshot>, StoreError> {
        let snapshots = read(&self.snapshots)?;
        // max_by_key keeps the last of equal versions, i.e. the newest row
        Ok(snapshots
            .get(&stream_id)
            .and_then(|rows| {
                rows.iter().filter(|s| s.version <= max_version).max_by_key(|s| s.version)
            })
            .cloned())
    }
}

// =============================================================================
// Sequence Repository Implementation
// =============================================================================

#[async_trait]
impl SequenceRepository for MemoryStore {
    async fn find_counter(&self, name: &str) -> Result<Option<u64>, StoreError> {
        let sequences = read(&self.sequences)?;
        Ok(sequences.get(name).copied())
    }

    async fn insert_counter(&self, name: &str, value: u64) -> Result<bool, StoreError> {
        let mut sequences = write(&self.sequences)?;
        if sequences.contains_key(name) {
            return Ok(false);
        }
        sequences.insert(name.to_string(), value);
        Ok(true)
    }

    async fn compare_and_set_counter(
        &self,
        name: &str,
        expected_value: u64,
        new_value: u64,
    ) -> Result<bool, StoreError> {
        let mut sequences = write(&self.sequences)?;
        match sequences.get_mut(name) {
            Some(value) if *value == expected_value => {
                *value = new_value;
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

// =============================================================================
// Checkpoint Repository Implementation
// =============================================================================

#[async_trait]
impl CheckpointRepository for MemoryStore {
    async fn insert_checkpoint(&self, checkpoint: &PipelineCheckpoint) -> Result<(), StoreError> {
        let mut checkpoints = write(&self.checkpoints)?;
        if checkpoints.iter().any(|c| c.insertion_order == checkpoint.insertion_order) {
            return Err(StoreError::duplicate("checkpoint", checkpoint.insertion_order));
        }
        checkpoints.push(checkpoint.clone());
        Ok(())
    }

    async fn find_latest_checkpoint(
        &self,
        pipeline_name: &str,
    ) -> Result<Option<PipelineCheckpoint>, StoreError> {
        let checkpoints = read(&self.checkpoints)?;
        Ok(checkpoints
            .iter()
            .filter(|c| c.pipeline_name == pipeline_name)
            .max_by_key(|c| c.insertion_order)
            .cloned())
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn events(&self) -> &dyn EventRepository {
        self
    }

    fn streams(&self) -> &dyn StreamRepository {
        self
    }

    fn snapshots(&self) -> &dyn SnapshotRepository {
        self
    }

    fn sequences(&self) -> &dyn SequenceRepository {
        self
    }

    fn checkpoints(&self) -> &dyn CheckpointRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
