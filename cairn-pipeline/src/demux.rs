//! Demultiplexer
//!
//! Releases at most one element per grouping key at a time. A key is busy
//! while it has an entry in the map; later elements of a busy key wait in
//! that entry's FIFO queue until the in-flight one is completed.
//!
//! Per-key state lives in a sharded map, so keys on different shards never
//! contend on one lock. Notifications are raised after the shard lock is
//! released.

use std::collections::VecDeque;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::element::ProcessingElement;
use crate::signal::Signal;

/// Per-key serializing demultiplexer.
pub struct Demultiplexer<E: ProcessingElement> {
    busy: DashMap<E::Key, VecDeque<E>>,
    demultiplexed: Signal<E>,
}

impl<E: ProcessingElement> Demultiplexer<E> {
    pub fn new() -> Self {
        Self { busy: DashMap::new(), demultiplexed: Signal::new() }
    }

    /// Receive every element released for processing
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        self.demultiplexed.subscribe()
    }

    /// Offer an element.
    ///
    /// Released immediately if its key is idle, queued behind the in-flight
    /// element otherwise.
    pub fn demultiplex(&self, element: E) {
        let released = match self.busy.entry(element.grouping_key()) {
            Entry::Occupied(mut queue) => {
                trace!(
                    key = ?queue.key(),
                    element_id = %element.unique_id(),
                    "Key busy, element queued"
                );
                queue.get_mut().push_back(element);
                None
            },
            Entry::Vacant(idle) => {
                idle.insert(VecDeque::new());
                Some(element)
            },
        };

        if let Some(element) = released {
            self.demultiplexed.raise(element);
        }
    }

    /// Finish the in-flight element of `key`.
    ///
    /// Releases the next queued element of the key, or marks the key idle.
    pub fn complete(&self, key: &E::Key) {
        let released = match self.busy.entry(key.clone()) {
            Entry::Occupied(mut queue) => match queue.get_mut().pop_front() {
                Some(next) => Some(next),
                None => {
                    queue.remove();
                    None
                },
            },
            Entry::Vacant(_) => {
                warn!(key = ?key, "Complete called for an idle key, ignoring");
                None
            },
        };

        if let Some(element) = released {
            self.demultiplexed.raise(element);
        }
    }

    /// True when no key has an element in flight
    pub fn is_idle(&self) -> bool {
        self.busy.is_empty()
    }

    /// Number of keys with an element in flight
    pub fn busy_keys(&self) -> usize {
        self.busy.len()
    }

    /// Elements of `key` waiting behind the in-flight one
    pub fn queued_len(&self, key: &E::Key) -> usize {
        self.busy.get(key).map(|queue| queue.len()).unwrap_or(0)
    }
}

impl<E: ProcessingElement> Default for Demultiplexer<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Uuid,
        key: &'static str,
        seq: u64,
    }

    impl Item {
        fn new(key: &'static str, seq: u64) -> Self {
            Self { id: Uuid::new_v4(), key, seq }
        }
    }

    impl ProcessingElement for Item {
        type Key = &'static str;

        fn unique_id(&self) -> Uuid {
            self.id
        }

        fn grouping_key(&self) -> &'static str {
            self.key
        }

        fn sequence_number(&self) -> u64 {
            self.seq
        }
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<Item>) -> Vec<u64> {
        let mut released = Vec::new();
        while let Ok(item) = receiver.try_recv() {
            released.push(item.seq);
        }
        released
    }

    #[test]
    fn test_distinct_keys_released_together() {
        let demux = Demultiplexer::new();
        let mut released = demux.subscribe();

        demux.demultiplex(Item::new("a", 1));
        demux.demultiplex(Item::new("b", 2));

        assert_eq!(drain(&mut released), vec![1, 2]);
        assert_eq!(demux.busy_keys(), 2);
    }

    #[test]
    fn test_same_key_released_after_complete() {
        let demux = Demultiplexer::new();
        let mut released = demux.subscribe();

        demux.demultiplex(Item::new("a", 1));
        demux.demultiplex(Item::new("a", 2));

        assert_eq!(drain(&mut released), vec![1]);
        assert_eq!(demux.queued_len(&"a"), 1);

        demux.complete(&"a");
        assert_eq!(drain(&mut released), vec![2]);
        assert_eq!(demux.queued_len(&"a"), 0);
        assert!(!demux.is_idle());

        demux.complete(&"a");
        assert!(drain(&mut released).is_empty());
        assert!(demux.is_idle());
    }

    #[test]
    fn test_queue_is_fifo() {
        let demux = Demultiplexer::new();
        let mut released = demux.subscribe();

        for seq in 1..=4 {
            demux.demultiplex(Item::new("a", seq));
        }

        let mut order = drain(&mut released);
        for _ in 0..3 {
            demux.complete(&"a");
            order.extend(drain(&mut released));
        }

        assert_eq!(order, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_complete_on_idle_key_is_ignored() {
        let demux: Demultiplexer<Item> = Demultiplexer::new();
        let mut released = demux.subscribe();

        demux.complete(&"nobody");

        assert!(drain(&mut released).is_empty());
        assert!(demux.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_two_in_flight_per_key() {
        let demux = Arc::new(Demultiplexer::new());
        let mut released = demux.subscribe();
        let keys = ["a", "b", "c"];

        let mut producers = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            let demux = demux.clone();
            let key = *key;
            producers.push(tokio::spawn(async move {
                for n in 0..50u64 {
                    demux.demultiplex(Item::new(key, (i as u64) * 100 + n));
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        // Everything released between two rounds of completes is in flight at once
        let mut last_seen = std::collections::HashMap::new();
        let mut finished = 0;
        while finished < 150 {
            let mut batch = vec![released.recv().await.unwrap()];
            while let Ok(item) = released.try_recv() {
                batch.push(item);
            }

            let mut in_flight = std::collections::HashSet::new();
            for item in &batch {
                assert!(in_flight.insert(item.key), "key {} released twice", item.key);
                if let Some(previous) = last_seen.insert(item.key, item.seq) {
                    assert!(item.seq > previous, "key {} released out of order", item.key);
                }
            }

            for item in batch {
                finished += 1;
                demux.complete(&item.key);
            }
        }

        assert!(demux.is_idle());
    }
}
