//! Processing elements
//!
//! The pipeline moves elements, not raw records: each element knows which
//! key it must be serialized on and where it sits in the fetch order.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use cairn_domain::{EventId, EventRecord, StreamId};
use uuid::Uuid;

/// An item flowing through the demultiplexer and the processor.
pub trait ProcessingElement: Clone + Send + Sync + 'static {
    /// Key whose elements must never be processed concurrently
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    /// Identity of the element, used in logs
    fn unique_id(&self) -> Uuid;

    /// Serialization key
    fn grouping_key(&self) -> Self::Key;

    /// Gapless position in the order the pipeline received elements (from 1)
    fn sequence_number(&self) -> u64;
}

/// A committed event wrapped for processing.
#[derive(Debug, Clone)]
pub struct EventElement {
    record: Arc<EventRecord>,
    sequence_number: u64,
    grouping_key: Uuid,
}

impl EventElement {
    /// Wrap `record`, grouped by its stream
    pub fn new(record: EventRecord, sequence_number: u64) -> Self {
        let grouping_key = record.stream_id;
        Self::with_key(record, sequence_number, grouping_key)
    }

    /// Wrap `record` with an explicit grouping key
    pub fn with_key(record: EventRecord, sequence_number: u64, grouping_key: Uuid) -> Self {
        Self { record: Arc::new(record), sequence_number, grouping_key }
    }

    pub fn record(&self) -> &EventRecord {
        &self.record
    }

    pub fn event_id(&self) -> EventId {
        self.record.event_id
    }

    pub fn stream_id(&self) -> StreamId {
        self.record.stream_id
    }
}

impl ProcessingElement for EventElement {
    type Key = Uuid;

    fn unique_id(&self) -> Uuid {
        self.record.event_id
    }

    fn grouping_key(&self) -> Uuid {
        self.grouping_key
    }

    fn sequence_number(&self) -> u64 {
        self.sequence_number
    }
}
