//! Stream heads and snapshots

use serde::{Deserialize, Serialize};

use crate::StreamId;

/// Version bookkeeping for one stream.
///
/// INVARIANT: `current_version` equals the `stream_seq` of the last appended
/// event + 1 (0 for a stream with no events).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHead {
    /// Stream identifier
    pub stream_id: StreamId,
    /// Number of events committed to the stream
    pub current_version: u64,
    /// Kind of entity the stream belongs to
    pub type_tag: String,
}

impl StreamHead {
    /// Create a head for a stream
    pub fn new(stream_id: StreamId, current_version: u64, type_tag: impl Into<String>) -> Self {
        Self { stream_id, current_version, type_tag: type_tag.into() }
    }
}

/// Point-in-time state of a stream, valid as of `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stream identifier
    pub stream_id: StreamId,
    /// Stream version the snapshot reflects
    pub version: u64,
    /// Opaque payload
    pub payload: Vec<u8>,
}

impl Snapshot {
    /// Create a snapshot
    pub fn new(stream_id: StreamId, version: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self { stream_id, version, payload: payload.into() }
    }
}
