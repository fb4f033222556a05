//! Test helper functions for seeding and observing pipelines.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use cairn_domain::{EventId, EventRecord, NewEvent, StreamId};
use cairn_eventlog::EventLog;
use cairn_pipeline::{ElementProcessor, EventElement, ProcessingElement};
use cairn_store::Store;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Event with an empty JSON object payload.
pub fn event(type_tag: &str) -> NewEvent {
    NewEvent::new(type_tag, b"{}".to_vec())
}

/// Event with a JSON payload.
pub fn json_event(type_tag: &str, payload: serde_json::Value) -> NewEvent {
    NewEvent::new(type_tag, payload.to_string().into_bytes())
}

/// Append one event per tag to `stream_id`, at whatever version the stream is at.
pub async fn seed_stream<S: Store + ?Sized>(
    log: &EventLog<S>,
    stream_id: StreamId,
    type_tags: &[&str],
) -> Result<Vec<EventRecord>> {
    let version = log.stream_version(stream_id).await?.unwrap_or(0);
    let events = type_tags.iter().map(|tag| event(tag)).collect();
    Ok(log.append(stream_id, version, events).await?)
}

/// Append `per_stream` events to each of `streams` new streams, round-robin,
/// so that consecutive global positions belong to different streams.
///
/// Returns the stream ids and every committed record in global order.
pub async fn seed_interleaved<S: Store + ?Sized>(
    log: &EventLog<S>,
    streams: usize,
    per_stream: usize,
) -> Result<(Vec<StreamId>, Vec<EventRecord>)> {
    let stream_ids: Vec<StreamId> = (0..streams).map(|_| Uuid::now_v7()).collect();
    let mut committed = Vec::with_capacity(streams * per_stream);

    for round in 0..per_stream {
        for stream_id in &stream_ids {
            let tag = format!("Step{}", round);
            let mut records = log.append(*stream_id, round as u64, vec![event(&tag)]).await?;
            committed.append(&mut records);
        }
    }

    Ok((stream_ids, committed))
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Records every element it sees and detects same-key overlap.
#[derive(Default)]
pub struct RecordingHandler {
    seen: Mutex<Vec<EventRecord>>,
    active: Mutex<HashSet<Uuid>>,
    overlaps: AtomicUsize,
    delay: Duration,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each element for `delay` before finishing it
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    /// Records handled so far, in completion order
    pub fn seen(&self) -> Vec<EventRecord> {
        lock(&self.seen).clone()
    }

    pub fn seen_ids(&self) -> Vec<EventId> {
        lock(&self.seen).iter().map(|r| r.event_id).collect()
    }

    pub fn count(&self) -> usize {
        lock(&self.seen).len()
    }

    /// Times an element started while another of the same key was running
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ElementProcessor<EventElement> for RecordingHandler {
    async fn process(&self, element: &EventElement) -> anyhow::Result<()> {
        let key = element.grouping_key();
        if !lock(&self.active).insert(key) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        lock(&self.seen).push(element.record().clone());
        lock(&self.active).remove(&key);
        Ok(())
    }
}

/// Fails on chosen events, succeeds (and records) on everything else.
#[derive(Default)]
pub struct FailingHandler {
    failing: HashSet<EventId>,
    attempts: AtomicUsize,
    inner: RecordingHandler,
}

impl FailingHandler {
    /// Fail every time on any of `event_ids`
    pub fn on_events(event_ids: impl IntoIterator<Item = EventId>) -> Self {
        Self { failing: event_ids.into_iter().collect(), ..Self::default() }
    }

    /// Handler calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Records handled successfully
    pub fn succeeded(&self) -> Vec<EventRecord> {
        self.inner.seen()
    }
}

#[async_trait]
impl ElementProcessor<EventElement> for FailingHandler {
    async fn process(&self, element: &EventElement) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&element.event_id()) {
            anyhow::bail!("injected failure for event {}", element.event_id());
        }
        self.inner.process(element).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_log;

    #[tokio::test]
    async fn test_seed_stream_continues_version() {
        let log = memory_log();
        let stream_id = Uuid::now_v7();

        seed_stream(&log, stream_id, &["A", "B"]).await.unwrap();
        let more = seed_stream(&log, stream_id, &["C"]).await.unwrap();

        assert_eq!(more[0].stream_seq, 2);
    }

    #[tokio::test]
    async fn test_seed_interleaved_alternates_streams() {
        let log = memory_log();

        let (streams, committed) = seed_interleaved(&log, 3, 2).await.unwrap();

        assert_eq!(committed.len(), 6);
        assert_eq!(committed[0].stream_id, streams[0]);
        assert_eq!(committed[1].stream_id, streams[1]);
        assert_eq!(committed[3].stream_id, streams[0]);
        assert_eq!(committed[3].stream_seq, 1);
    }

    #[tokio::test]
    async fn test_wait_until_times_out() {
        assert!(!wait_until(Duration::from_millis(30), || false).await);
        assert!(wait_until(Duration::from_millis(30), || true).await);
    }
}
