//! Sequence Allocation
//!
//! Hands out strictly increasing values from named counters. The increment is
//! a read followed by a conditional write; losing the write to a racing
//! allocator is expected contention and is retried until it succeeds.
//!
//! Event positions go through [`SequenceAllocator::commit`], which claims the
//! positions and stores the events in the same conditional write. Positions
//! therefore become readable in order, with no hole left by a slower writer.

use std::sync::Arc;

use cairn_domain::EventRecord;
use cairn_store::{Store, StoreError};
use tracing::trace;

/// Counter that orders every event in the log
pub const EVENT_SEQUENCE: &str = "events";

/// Counter that orders checkpoint rows
pub const PIPELINE_SEQUENCE: &str = "pipeline";

/// Compare-and-swap allocator over the store's sequence counters.
pub struct SequenceAllocator<S: Store + ?Sized> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> Clone for SequenceAllocator<S> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone() }
    }
}

impl<S: Store + ?Sized> SequenceAllocator<S> {
    /// Create an allocator over `store`
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Increment the counter `name` and return the new value.
    ///
    /// Never returns the same value twice for the same counter. A counter
    /// that doesn't exist yet starts at 0, so the first value is 1.
    ///
    /// # Errors
    /// - `StoreError` when the store itself fails; CAS rejections are retried
    pub async fn next(&self, name: &str) -> Result<u64, StoreError> {
        let sequences = self.store.sequences();
        let mut attempts: u32 = 0;

        loop {
            let current = match sequences.find_counter(name).await? {
                Some(value) => value,
                None => {
                    if !sequences.insert_counter(name, 0).await? {
                        trace!(sequence = name, "Counter created by a concurrent allocator");
                    }
                    continue;
                },
            };

            let next = current
                .checked_add(1)
                .ok_or_else(|| StoreError::out_of_range("sequence", current))?;

            if sequences.compare_and_set_counter(name, current, next).await? {
                if attempts > 0 {
                    trace!(sequence = name, value = next, attempts, "Sequence allocated after retries");
                }
                return Ok(next);
            }

            attempts = attempts.saturating_add(1);
            trace!(sequence = name, observed = current, attempts, "Sequence update rejected, retrying");
            tokio::task::yield_now().await;
        }
    }

    /// Store a batch at the next free positions of counter `name`.
    ///
    /// `build` receives the first free position and returns the records
    /// numbered consecutively from it. It is called again with a fresh
    /// position each time another writer commits first.
    ///
    /// # Errors
    /// - `StoreError` when the store fails or rejects a record; lost races are retried
    pub async fn commit<F>(&self, name: &str, mut build: F) -> Result<Vec<EventRecord>, StoreError>
    where
        F: FnMut(u64) -> Vec<EventRecord>,
    {
        let mut attempts: u32 = 0;

        loop {
            let current = self.current(name).await?;
            let first = current
                .checked_add(1)
                .ok_or_else(|| StoreError::out_of_range("sequence", current))?;

            let records = build(first);
            if self.store.events().commit_events(name, &records).await? {
                if attempts > 0 {
                    trace!(sequence = name, first, attempts, "Positions committed after retries");
                }
                return Ok(records);
            }

            attempts = attempts.saturating_add(1);
            trace!(sequence = name, observed = current, attempts, "Commit rejected, retrying");
            tokio::task::yield_now().await;
        }
    }

    /// Last value handed out by `name` (0 if the counter doesn't exist)
    pub async fn current(&self, name: &str) -> Result<u64, StoreError> {
        Ok(self.store.sequences().find_counter(name).await?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cairn_domain::{EventId, NewEvent, StreamId};
    use cairn_store::{
        CheckpointRepository, EventRepository, MemoryStore, SequenceRepository, SnapshotRepository,
        StreamRepository,
    };
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rejects the first N conditional writes after letting a rival take a value.
    struct ContendedStore {
        inner: MemoryStore,
        rejections: AtomicUsize,
    }

    impl ContendedStore {
        fn new(rejections: usize) -> Self {
            Self { inner: MemoryStore::new(), rejections: AtomicUsize::new(rejections) }
        }
    }

    #[async_trait]
    impl SequenceRepository for ContendedStore {
        async fn find_counter(&self, name: &str) -> Result<Option<u64>, StoreError> {
            self.inner.find_counter(name).await
        }

        async fn insert_counter(&self, name: &str, value: u64) -> Result<bool, StoreError> {
            self.inner.insert_counter(name, value).await
        }

        async fn compare_and_set_counter(
            &self,
            name: &str,
            expected_value: u64,
            new_value: u64,
        ) -> Result<bool, StoreError> {
            let remaining = self.rejections.load(Ordering::SeqCst);
            if remaining > 0 {
                self.rejections.store(remaining - 1, Ordering::SeqCst);
                // A rival allocator wins the race for this value
                self.inner.compare_and_set_counter(name, expected_value, new_value).await?;
                return Ok(false);
            }
            self.inner.compare_and_set_counter(name, expected_value, new_value).await
        }
    }

    #[async_trait]
    impl EventRepository for ContendedStore {
        async fn commit_events(
            &self,
            sequence: &str,
            records: &[EventRecord],
        ) -> Result<bool, StoreError> {
            let remaining = self.rejections.load(Ordering::SeqCst);
            if remaining > 0 {
                self.rejections.store(remaining - 1, Ordering::SeqCst);
                // A rival writer commits one event at the same position
                let position = records[0].global_seq;
                let rival = NewEvent::new("Rival", Vec::new()).into_record(
                    uuid::Uuid::now_v7(),
                    0,
                    position,
                );
                assert!(self.inner.commit_events(sequence, &[rival]).await?);
                return Ok(false);
            }
            self.inner.commit_events(sequence, records).await
        }

        async fn find_by_stream(
            &self,
            stream_id: StreamId,
            min_seq: u64,
            max_seq: u64,
        ) -> Result<Vec<EventRecord>, StoreError> {
            self.inner.find_by_stream(stream_id, min_seq, max_seq).await
        }

        async fn find_after(
            &self,
            after: Option<u64>,
            limit: usize,
        ) -> Result<Vec<EventRecord>, StoreError> {
            self.inner.find_after(after, limit).await
        }

        async fn find_global_seq(&self, event_id: EventId) -> Result<Option<u64>, StoreError> {
            self.inner.find_global_seq(event_id).await
        }
    }

    impl Store for ContendedStore {
        fn events(&self) -> &dyn EventRepository {
            self
        }

        fn streams(&self) -> &dyn StreamRepository {
            &self.inner
        }

        fn snapshots(&self) -> &dyn SnapshotRepository {
            &self.inner
        }

        fn sequences(&self) -> &dyn SequenceRepository {
            self
        }

        fn checkpoints(&self) -> &dyn CheckpointRepository {
            &self.inner
        }
    }

    #[tokio::test]
    async fn test_first_value_is_one() {
        let allocator = SequenceAllocator::new(Arc::new(MemoryStore::new()));

        assert_eq!(allocator.current(EVENT_SEQUENCE).await.unwrap(), 0);
        assert_eq!(allocator.next(EVENT_SEQUENCE).await.unwrap(), 1);
        assert_eq!(allocator.next(EVENT_SEQUENCE).await.unwrap(), 2);
        assert_eq!(allocator.current(EVENT_SEQUENCE).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_counters_are_independent() {
        let allocator = SequenceAllocator::new(Arc::new(MemoryStore::new()));

        allocator.next(EVENT_SEQUENCE).await.unwrap();
        allocator.next(EVENT_SEQUENCE).await.unwrap();

        assert_eq!(allocator.next(PIPELINE_SEQUENCE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejected_update_is_retried() {
        let allocator = SequenceAllocator::new(Arc::new(ContendedStore::new(3)));

        // Three rivals took 1, 2 and 3
        let value = allocator.next(EVENT_SEQUENCE).await.unwrap();
        assert_eq!(value, 4);

        assert_eq!(allocator.next(EVENT_SEQUENCE).await.unwrap(), 5);
    }

    fn numbered(stream_id: StreamId, count: u64) -> impl FnMut(u64) -> Vec<EventRecord> {
        move |first| {
            (0..count)
                .map(|i| {
                    NewEvent::new("Numbered", Vec::new()).into_record(stream_id, i, first + i)
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_commit_numbers_batch_from_next_position() {
        let store = Arc::new(MemoryStore::new());
        let allocator = SequenceAllocator::new(store.clone());
        allocator.next(EVENT_SEQUENCE).await.unwrap();

        let records =
            allocator.commit(EVENT_SEQUENCE, numbered(uuid::Uuid::now_v7(), 3)).await.unwrap();

        let positions: Vec<u64> = records.iter().map(|r| r.global_seq).collect();
        assert_eq!(positions, vec![2, 3, 4]);
        assert_eq!(allocator.current(EVENT_SEQUENCE).await.unwrap(), 4);
        assert_eq!(store.event_count(), 3);
    }

    #[tokio::test]
    async fn test_commit_rebuilds_after_losing_race() {
        let store = Arc::new(ContendedStore::new(2));
        let allocator = SequenceAllocator::new(store.clone());

        // Two rivals took positions 1 and 2
        let records =
            allocator.commit(EVENT_SEQUENCE, numbered(uuid::Uuid::now_v7(), 1)).await.unwrap();

        assert_eq!(records[0].global_seq, 3);
        let stored = store.inner.find_after(None, 10).await.unwrap();
        let positions: Vec<u64> = stored.iter().map(|r| r.global_seq).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_leave_no_gaps() {
        let allocator = SequenceAllocator::new(Arc::new(MemoryStore::new()));
        let mut tasks = Vec::new();

        for _ in 0..8 {
            let allocator = allocator.clone();
            tasks.push(tokio::spawn(async move {
                let stream_id = uuid::Uuid::now_v7();
                for batch in 0..5u64 {
                    let records = allocator
                        .commit(EVENT_SEQUENCE, |first| {
                            (0..2)
                                .map(|i| {
                                    NewEvent::new("Numbered", Vec::new()).into_record(
                                        stream_id,
                                        batch * 2 + i,
                                        first + i,
                                    )
                                })
                                .collect()
                        })
                        .await
                        .unwrap();
                    assert_eq!(records[1].global_seq, records[0].global_seq + 1);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(allocator.current(EVENT_SEQUENCE).await.unwrap(), 80);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_never_repeat() {
        let allocator = SequenceAllocator::new(Arc::new(MemoryStore::new()));
        let mut tasks = Vec::new();

        for _ in 0..16 {
            let allocator = allocator.clone();
            tasks.push(tokio::spawn(async move {
                let mut values = Vec::new();
                for _ in 0..25 {
                    values.push(allocator.next(EVENT_SEQUENCE).await.unwrap());
                }
                values
            }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            for value in task.await.unwrap() {
                assert!(seen.insert(value), "value {} handed out twice", value);
            }
        }

        assert_eq!(seen.len(), 400);
        assert_eq!(seen.iter().max().copied(), Some(400));
        assert_eq!(allocator.current(EVENT_SEQUENCE).await.unwrap(), 400);
    }
}
