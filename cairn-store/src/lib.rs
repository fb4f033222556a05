//! Cairn Storage Layer
//!
//! Persistence for events, stream heads, snapshots, sequence counters and
//! pipeline checkpoints.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports). A backend only
//!   needs conditional (compare-and-swap) writes and range scans ordered by an
//!   integer key.
//! - **In-memory store**: Fast implementation for testing and development
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use cairn_store::{MemoryStore, Store};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let created = store.sequences().insert_counter("events", 0).await.unwrap();
//!     assert!(created);
//!
//!     let value = store.sequences().find_counter("events").await.unwrap();
//!     assert_eq!(value, Some(0));
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{
    CheckpointRepository, EventRepository, SequenceRepository, SnapshotRepository, Store,
    StreamRepository,
};
