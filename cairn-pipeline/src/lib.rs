//! Cairn Pipeline
//!
//! Consumes the event log in global order while guaranteeing that two
//! elements with the same grouping key (by default, the same stream) are
//! never processed at the same time, and checkpoints only the prefix of the
//! log that has fully finished.
//!
//! Building blocks, leaves first:
//! - [`CursorPositionCalculator`]: contiguous progress over out-of-order completions
//! - [`Demultiplexer`]: one in-flight element per key, FIFO queue behind it
//! - [`PipelineProcessor`]: runs the host callback, contains its failures
//! - [`CheckpointStore`]: last processed event per named pipeline
//! - [`Pipeline`]: the polling loop that ties them together

pub mod checkpoint;
pub mod config;
pub mod cursor;
pub mod demux;
pub mod element;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod signal;

pub use checkpoint::CheckpointStore;
pub use config::PipelineConfig;
pub use cursor::CursorPositionCalculator;
pub use demux::Demultiplexer;
pub use element::{EventElement, ProcessingElement};
pub use error::{PipelineError, Result};
pub use pipeline::{KeyFn, Pipeline, PipelineStats, StatsSnapshot};
pub use processor::{ElementProcessor, PipelineProcessor};
pub use registry::{EventHandler, HandlerRegistry};
pub use signal::Signal;
