//! Test helpers for Cairn.
//!
//! Provides event builders, stream seeding and instrumented handlers for
//! pipeline tests.

mod helpers;

pub use helpers::{
    event, json_event, seed_interleaved, seed_stream, wait_until, FailingHandler, RecordingHandler,
};

use std::sync::Arc;

use cairn_eventlog::EventLog;
use cairn_store::MemoryStore;

/// Event log over a fresh in-memory store.
pub fn memory_log() -> EventLog<MemoryStore> {
    EventLog::new(Arc::new(MemoryStore::new()))
}

