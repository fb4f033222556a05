//! Cairn Domain Layer
//!
//! Plain data types shared by every layer of the event log and the
//! consumption pipeline. No I/O lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod checkpoint;
pub mod events;
pub mod stream;

// Re-export commonly used types
pub use checkpoint::{PipelineCheckpoint, SequenceCounter};
pub use events::{EventRecord, NewEvent, UncommittedEvent, DEFAULT_EVENT_VERSION};
pub use stream::{Snapshot, StreamHead};

/// Identifier of an event stream (one logical entity).
pub type StreamId = uuid::Uuid;

/// Identifier of a single event.
pub type EventId = uuid::Uuid;
