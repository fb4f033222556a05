//! Event Appending with Optimistic Concurrency

use std::sync::Arc;

use cairn_domain::{EventRecord, NewEvent, StreamHead, StreamId, UncommittedEvent};
use cairn_store::Store;
use tracing::{debug, warn};

use crate::sequence::{SequenceAllocator, EVENT_SEQUENCE};
use crate::types::{EventLogError, Result, StreamAppendResult};

/// Stream type recorded on heads created through [`EventLog::append`]
pub const DEFAULT_STREAM_TYPE: &str = "stream";

/// Append-only event log over a [`Store`].
///
/// Cheap to clone; clones share the store.
pub struct EventLog<S: Store + ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) sequences: SequenceAllocator<S>,
}

impl<S: Store + ?Sized> Clone for EventLog<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), sequences: self.sequences.clone() }
    }
}

impl<S: Store + ?Sized> EventLog<S> {
    /// Create an event log over `store`
    pub fn new(store: Arc<S>) -> Self {
        let sequences = SequenceAllocator::new(store.clone());
        Self { store, sequences }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Allocator used for global event positions
    pub fn sequences(&self) -> &SequenceAllocator<S> {
        &self.sequences
    }

    /// Append events to a stream.
    ///
    /// # Arguments
    /// * `stream_id` - Target stream
    /// * `expected_version` - Stream version the writer last observed (0 for a new stream)
    /// * `events` - Events to append, in order
    ///
    /// # Returns
    /// The committed records (empty if `events` is empty)
    ///
    /// # Errors
    /// - `Validation` for a nil stream id or an empty type tag
    /// - `Concurrency` if another writer advanced the stream first
    /// - `Store` on storage faults
    pub async fn append(
        &self,
        stream_id: StreamId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        self.append_as(DEFAULT_STREAM_TYPE, stream_id, expected_version, events).await
    }

    /// Append events to a stream, recording `stream_type` on the head if the
    /// stream is new.
    pub async fn append_as(
        &self,
        stream_type: &str,
        stream_id: StreamId,
        expected_version: u64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<EventRecord>> {
        validate(stream_id, &events)?;

        if events.is_empty() {
            return Ok(Vec::new());
        }

        let final_version = expected_version
            .checked_add(events.len() as u64)
            .ok_or_else(|| EventLogError::Validation("stream version overflow".to_string()))?;

        // 1. Claim the version range on the head
        self.advance_head(stream_type, stream_id, expected_version, final_version).await?;

        // 2. Claim global positions and store the batch in one step
        let committed = self
            .sequences
            .commit(EVENT_SEQUENCE, |first| {
                (expected_version..)
                    .zip(first..)
                    .zip(events.iter().cloned())
                    .map(|((stream_seq, global_seq), event)| {
                        event.into_record(stream_id, stream_seq, global_seq)
                    })
                    .collect()
            })
            .await?;

        debug!(
            stream_id = %stream_id,
            from_version = expected_version,
            to_version = final_version,
            count = committed.len(),
            "Events appended"
        );

        Ok(committed)
    }

    /// Append a batch spanning several streams.
    ///
    /// Events are grouped by stream in first-seen order and each group is
    /// appended on its own; a conflict on one stream does not block the others.
    pub async fn append_streams(&self, events: Vec<UncommittedEvent>) -> Vec<StreamAppendResult> {
        let mut groups: Vec<(StreamId, u64, Vec<NewEvent>)> = Vec::new();

        for entry in events {
            match groups.iter_mut().find(|(stream_id, _, _)| *stream_id == entry.stream_id) {
                Some((_, _, batch)) => batch.push(entry.event),
                None => groups.push((entry.stream_id, entry.expected_version, vec![entry.event])),
            }
        }

        let mut results = Vec::with_capacity(groups.len());
        for (stream_id, expected_version, batch) in groups {
            let result = self.append(stream_id, expected_version, batch).await;
            results.push(StreamAppendResult { stream_id, result });
        }

        results
    }

    async fn advance_head(
        &self,
        stream_type: &str,
        stream_id: StreamId,
        expected_version: u64,
        final_version: u64,
    ) -> Result<()> {
        let streams = self.store.streams();

        let claimed = match streams.find_head(stream_id).await? {
            None if expected_version != 0 => false,
            None => {
                let head = StreamHead::new(stream_id, final_version, stream_type);
                streams.insert_head(&head).await?
            },
            Some(head) if head.current_version != expected_version => false,
            Some(_) => {
                streams
                    .compare_and_set_version(stream_id, expected_version, final_version)
                    .await?
            },
        };

        if !claimed {
            warn!(
                stream_id = %stream_id,
                expected_version,
                attempted_version = final_version,
                "Concurrency conflict on append"
            );
            return Err(EventLogError::conflict(stream_id, final_version));
        }

        Ok(())
    }
}

fn validate(stream_id: StreamId, events: &[NewEvent]) -> Result<()> {
    if stream_id.is_nil() {
        return Err(EventLogError::Validation("stream id must not be nil".to_string()));
    }

    if let Some(event) = events.iter().find(|e| e.type_tag.trim().is_empty()) {
        return Err(EventLogError::Validation(format!(
            "event {} has an empty type tag",
            event.event_id
        )));
    }

    Ok(())
}
