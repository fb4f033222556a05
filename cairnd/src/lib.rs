//! Cairn Daemon Library
//!
//! Thin host around one pipeline.
//!
//! # Architecture
//!
//! ```text
//! Writers → Event Log → Stream Reader → Demultiplexer → Processor → Handlers
//!                                             ↑              ↓
//!                                    Checkpoint Store ← Cursor
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cairnd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod daemon;
pub mod error;

#[cfg(feature = "postgres")]
pub mod db;

// Re-exports for convenience
pub use config::{Config, Environment, LogFormat};
pub use daemon::{Daemon, EventTracer};
pub use error::{DaemonError, DaemonResult};
