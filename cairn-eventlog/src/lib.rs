//! Event Log Module
//!
//! Provides an append-only event log with:
//! - Optimistic concurrency control via per-stream versions
//! - A global total order assigned by a compare-and-swap sequence allocator
//! - Pull-based reads after a global position ([`StreamReader`])
//! - Append-only snapshots, raw or typed through serde
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use cairn_domain::NewEvent;
//! use cairn_eventlog::EventLog;
//! use cairn_store::MemoryStore;
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = EventLog::new(Arc::new(MemoryStore::new()));
//! let stream_id = Uuid::now_v7();
//!
//! let committed = log
//!     .append(stream_id, 0, vec![NewEvent::new("CustomerCreated", b"{}".to_vec())])
//!     .await?;
//! assert_eq!(committed[0].stream_seq, 0);
//!
//! // A second writer that still believes the stream is empty loses.
//! let stale = log.append(stream_id, 0, vec![NewEvent::new("CustomerRenamed", b"{}".to_vec())]).await;
//! assert!(stale.unwrap_err().is_concurrency());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod append;
pub mod query;
pub mod sequence;
pub mod snapshot;
pub mod types;

pub use append::{EventLog, DEFAULT_STREAM_TYPE};
pub use query::StreamReader;
pub use sequence::{SequenceAllocator, EVENT_SEQUENCE, PIPELINE_SEQUENCE};
pub use types::{EventLogError, Result, StreamAppendResult};
