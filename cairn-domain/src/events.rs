//! Event records
//!
//! A writer builds [`NewEvent`]s; the event log turns them into immutable
//! [`EventRecord`]s by assigning the stream position and the global position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EventId, StreamId};

/// Payload schema version stamped on events that don't set one.
pub const DEFAULT_EVENT_VERSION: &str = "1.0";

/// An event that has been committed to the log.
///
/// Immutable once appended. `global_seq` is unique and strictly increasing
/// across the whole log; `stream_seq` is contiguous from 0 within a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the total order of the log
    pub global_seq: u64,
    /// Stream the event belongs to
    pub stream_id: StreamId,
    /// Position within the stream (0, 1, 2, ...)
    pub stream_seq: u64,
    /// Unique event identifier
    pub event_id: EventId,
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
    /// Event type name used for handler dispatch
    pub type_tag: String,
    /// Payload schema version
    pub version: String,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl EventRecord {
    /// Decode the payload as JSON into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// An event that has not been appended yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Unique event identifier (chosen by the writer)
    pub event_id: EventId,
    /// Event type name
    pub type_tag: String,
    /// Payload schema version
    pub version: String,
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl NewEvent {
    /// Create a new event with a fresh time-ordered id.
    pub fn new(type_tag: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            type_tag: type_tag.into(),
            version: DEFAULT_EVENT_VERSION.to_string(),
            timestamp: Utc::now(),
            payload: payload.into(),
        }
    }

    /// Create a new event whose payload is `value` encoded as JSON.
    pub fn json<T: Serialize>(type_tag: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(type_tag, serde_json::to_vec(value)?))
    }

    /// Set the event id
    pub fn with_event_id(mut self, event_id: EventId) -> Self {
        self.event_id = event_id;
        self
    }

    /// Set the payload schema version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Turn this event into a committed record at the given positions.
    pub fn into_record(self, stream_id: StreamId, stream_seq: u64, global_seq: u64) -> EventRecord {
        EventRecord {
            global_seq,
            stream_id,
            stream_seq,
            event_id: self.event_id,
            timestamp: self.timestamp,
            type_tag: self.type_tag,
            version: self.version,
            payload: self.payload,
        }
    }
}

/// One entry of a batch that may span several streams.
///
/// Every entry of the same stream should carry the same `expected_version`;
/// the log uses the one from the first entry of each stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UncommittedEvent {
    /// Target stream
    pub stream_id: StreamId,
    /// Stream version the writer last observed
    pub expected_version: u64,
    /// The event itself
    pub event: NewEvent,
}

impl UncommittedEvent {
    /// Create a batch entry
    pub fn new(stream_id: StreamId, expected_version: u64, event: NewEvent) -> Self {
        Self { stream_id, expected_version, event }
    }
}
