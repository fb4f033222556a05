//! Event Query Operations

use std::sync::Arc;

use cairn_domain::{EventId, EventRecord, StreamId};
use cairn_store::Store;
use tracing::{debug, warn};

use crate::append::EventLog;
use crate::types::Result;

impl<S: Store + ?Sized> EventLog<S> {
    /// Events of a stream with `min_version <= stream_seq <= max_version`,
    /// ordered by `stream_seq`
    pub async fn read_from(
        &self,
        stream_id: StreamId,
        min_version: u64,
        max_version: u64,
    ) -> Result<Vec<EventRecord>> {
        if min_version > max_version {
            return Ok(Vec::new());
        }

        let events = self.store.events().find_by_stream(stream_id, min_version, max_version).await?;
        Ok(events)
    }

    /// Every event of a stream
    pub async fn read_stream(&self, stream_id: StreamId) -> Result<Vec<EventRecord>> {
        self.read_from(stream_id, 0, u64::MAX).await
    }

    /// Current version of a stream, `None` if nothing was ever appended
    pub async fn stream_version(&self, stream_id: StreamId) -> Result<Option<u64>> {
        let head = self.store.streams().find_head(stream_id).await?;
        Ok(head.map(|h| h.current_version))
    }

    /// Reader over the global order of this log
    pub fn reader(&self) -> StreamReader<S> {
        StreamReader::new(self.store.clone())
    }
}

/// Pull-based reader over the global order of the log.
pub struct StreamReader<S: Store + ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> Clone for StreamReader<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: Store + ?Sized> StreamReader<S> {
    /// Create a reader over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Up to `max_count` events with `global_seq` strictly after `after`,
    /// ascending. `None` reads from the beginning of the log.
    pub async fn get_after(&self, after: Option<u64>, max_count: usize) -> Result<Vec<EventRecord>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let events = self.store.events().find_after(after, max_count).await?;
        Ok(events)
    }

    /// Like [`get_after`](Self::get_after), starting after the event with id `after`.
    ///
    /// An id the log doesn't know reads from the beginning.
    pub async fn get_after_event(
        &self,
        after: Option<EventId>,
        max_count: usize,
    ) -> Result<Vec<EventRecord>> {
        let position = match after {
            Some(event_id) => self.position_of(event_id).await?,
            None => None,
        };

        self.get_after(position, max_count).await
    }

    /// Global position of an event.
    ///
    /// Unknown ids resolve to `None` (the beginning of the log).
    pub async fn position_of(&self, event_id: EventId) -> Result<Option<u64>> {
        match self.store.events().find_global_seq(event_id).await? {
            Some(global_seq) => {
                debug!(event_id = %event_id, global_seq, "Resolved event position");
                Ok(Some(global_seq))
            },
            None => {
                warn!(event_id = %event_id, "Unknown event id, reading from the beginning of the log");
                Ok(None)
            },
        }
    }
}
