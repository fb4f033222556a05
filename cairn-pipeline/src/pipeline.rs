//! Pipeline driver: polls the event log and feeds the consumption primitives.
//!
//! One loop task owns the cursor. It fetches batches after the last
//! checkpoint, numbers each event in fetch order, hands elements to the
//! demultiplexer and dispatches released elements to a bounded worker pool.
//! Processed notifications come back to the loop, which advances the cursor
//! and checkpoints once enough contiguous progress has accumulated.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cairn_domain::{EventId, EventRecord};
use cairn_eventlog::StreamReader;
use cairn_store::Store;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::cursor::CursorPositionCalculator;
use crate::demux::Demultiplexer;
use crate::element::{EventElement, ProcessingElement};
use crate::error::Result;
use crate::processor::{ElementProcessor, PipelineProcessor};

/// Maps an event to the key it is serialized on
pub type KeyFn = Arc<dyn Fn(&EventRecord) -> Uuid + Send + Sync>;

// =============================================================================
// Stats
// =============================================================================

/// Live pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineStats {
    fetched: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    checkpoints: AtomicU64,
    stall_warnings: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fetched: u64,
    pub processed: u64,
    pub failed: u64,
    pub checkpoints: u64,
    pub stall_warnings: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            stall_warnings: self.stall_warnings.load(Ordering::Relaxed),
        }
    }

    /// Elements whose handler has finished, either way
    fn settled(&self) -> u64 {
        self.processed.load(Ordering::Acquire) + self.failed.load(Ordering::Acquire)
    }

    fn record_outcome(&self, succeeded: bool) {
        if succeeded {
            self.processed.fetch_add(1, Ordering::Release);
        } else {
            self.failed.fetch_add(1, Ordering::Release);
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Loop state owned by the running pipeline.
struct RunState {
    cursor: CursorPositionCalculator,
    /// Fetch sequence numbers handed out so far
    fetched: u64,
    /// Global position of the last fetched event
    position: Option<u64>,
    /// Fetch sequence number → event id, for elements past the last checkpoint
    event_ids: BTreeMap<u64, EventId>,
    /// Frontier that back-pressure is holding, and since when
    stalled_since: Option<(u64, Instant)>,
}

/// Consumes the event log in order under a named checkpoint.
pub struct Pipeline<S: Store + ?Sized> {
    config: PipelineConfig,
    reader: StreamReader<S>,
    checkpoints: CheckpointStore<S>,
    handler: Arc<dyn ElementProcessor<EventElement>>,
    key_fn: KeyFn,
    stats: Arc<PipelineStats>,
}

impl<S: Store + ?Sized> Pipeline<S> {
    /// Create a pipeline over `store` that runs `handler` on every event.
    ///
    /// # Errors
    /// - `Config` if `config` fails validation
    pub fn new(
        store: Arc<S>,
        handler: Arc<dyn ElementProcessor<EventElement>>,
        config: PipelineConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            reader: StreamReader::new(store.clone()),
            checkpoints: CheckpointStore::new(store),
            handler,
            key_fn: Arc::new(|record: &EventRecord| record.stream_id),
            stats: Arc::new(PipelineStats::default()),
        })
    }

    /// Serialize on a key other than the stream id
    pub fn with_key_fn<F>(mut self, key_fn: F) -> Self
    where
        F: Fn(&EventRecord) -> Uuid + Send + Sync + 'static,
    {
        self.key_fn = Arc::new(key_fn);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Counters, readable while the pipeline runs
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` is cancelled, then drain and flush a final checkpoint.
    ///
    /// Handler failures never stop the pipeline; the failed element is not
    /// checkpointed past and is fetched again after a restart.
    ///
    /// # Errors
    /// - `EventLog`/`Store` if the starting checkpoint can't be loaded
    pub async fn run(self, shutdown: CancellationToken) -> Result<StatsSnapshot> {
        let name = self.config.name.clone();
        let resume_from = self.checkpoints.get_last(&name).await?;
        let position = match resume_from {
            Some(event_id) => self.reader.position_of(event_id).await?,
            None => None,
        };

        info!(
            pipeline = %name,
            resume_from = ?resume_from,
            position = ?position,
            batch_size = self.config.batch_size,
            workers = self.config.workers,
            "Pipeline started"
        );

        let demux = Arc::new(Demultiplexer::new());
        let mut released = demux.subscribe();
        let processor = Arc::new(PipelineProcessor::new(self.handler.clone(), demux.clone()));
        let mut processed = processor.subscribe();
        let permits = Arc::new(Semaphore::new(self.config.workers));
        let mut workers = JoinSet::new();

        let mut state = RunState {
            cursor: CursorPositionCalculator::new(0),
            fetched: 0,
            position,
            event_ids: BTreeMap::new(),
            stalled_since: None,
        };

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(pipeline = %name, "Pipeline shutdown requested");
                    break;
                }
                Some(element) = released.recv() => {
                    self.dispatch(&mut workers, &processor, &permits, element);
                }
                Some(element) = processed.recv() => {
                    state.cursor.append(element.sequence_number());
                    if state.cursor.sequence_length() >= self.config.checkpoint_threshold {
                        self.checkpoint(&mut state).await;
                    }
                }
                Some(joined) = workers.join_next() => {
                    if let Err(e) = joined {
                        error!(pipeline = %name, error = %e, "Pipeline worker task failed");
                    }
                }
                _ = ticker.tick() => {
                    match self.fetch(&mut state, &demux).await {
                        Ok(count) if count == self.config.batch_size => {
                            // More is probably waiting
                            ticker.reset_immediately();
                        }
                        Ok(count) if count > 0 => {
                            debug!(pipeline = %name, count, "Fetched events");
                        }
                        Err(e) => {
                            error!(pipeline = %name, error = %e, "Fetch failed (will retry)");
                        }
                        _ => {}
                    }
                }
            }
        }

        self.drain(&mut state, &mut workers, &processor, &permits, &mut released, &mut processed)
            .await;

        let summary = self.stats.snapshot();
        info!(
            pipeline = %name,
            fetched = summary.fetched,
            processed = summary.processed,
            failed = summary.failed,
            checkpoints = summary.checkpoints,
            "Pipeline stopped"
        );

        Ok(summary)
    }

    /// Fetch the next batch and demultiplex it.
    async fn fetch(&self, state: &mut RunState, demux: &Demultiplexer<EventElement>) -> Result<usize> {
        let in_flight = state.fetched - state.cursor.position();
        let room = self.config.max_in_flight.saturating_sub(in_flight);
        if room == 0 {
            trace!(pipeline = %self.config.name, in_flight, "Back-pressure, fetch skipped");
            self.watch_stall(state, in_flight);
            return Ok(0);
        }
        state.stalled_since = None;

        let limit = self.config.batch_size.min(usize::try_from(room).unwrap_or(usize::MAX));
        let events = self.reader.get_after(state.position, limit).await?;
        let count = events.len();

        for record in events {
            state.fetched += 1;
            state.position = Some(record.global_seq);
            state.event_ids.insert(state.fetched, record.event_id);

            let key = (self.key_fn)(&record);
            demux.demultiplex(EventElement::with_key(record, state.fetched, key));
        }

        self.stats.fetched.fetch_add(count as u64, Ordering::Relaxed);
        Ok(count)
    }

    /// Report a frontier that back-pressure has held for `stall_warning`.
    ///
    /// Usually an element whose handler keeps failing; fetching resumes only
    /// once it succeeds, normally after a restart.
    fn watch_stall(&self, state: &mut RunState, in_flight: u64) {
        let frontier = state.cursor.position();
        match state.stalled_since {
            Some((held, since)) if held == frontier => {
                if since.elapsed() >= self.config.stall_warning {
                    warn!(
                        pipeline = %self.config.name,
                        frontier,
                        in_flight,
                        stalled_ms = since.elapsed().as_millis() as u64,
                        next_event_id = ?state.event_ids.get(&(frontier + 1)),
                        "Pipeline stalled: frontier not advancing"
                    );
                    self.stats.stall_warnings.fetch_add(1, Ordering::Relaxed);
                    state.stalled_since = Some((frontier, Instant::now()));
                }
            },
            _ => state.stalled_since = Some((frontier, Instant::now())),
        }
    }

    fn dispatch(
        &self,
        workers: &mut JoinSet<()>,
        processor: &Arc<PipelineProcessor<EventElement>>,
        permits: &Arc<Semaphore>,
        element: EventElement,
    ) {
        let processor = processor.clone();
        let permits = permits.clone();
        let stats = self.stats.clone();

        workers.spawn(async move {
            // Never closed, so this only waits for a free worker
            let _permit = permits.acquire_owned().await.ok();
            let succeeded = processor.process_next(element).await;
            stats.record_outcome(succeeded);
        });
    }

    /// Checkpoint the event at the cursor frontier and start a new run.
    ///
    /// A failed write leaves the cursor untouched so the next attempt covers it.
    async fn checkpoint(&self, state: &mut RunState) {
        let position = state.cursor.position();
        let Some(&event_id) = state.event_ids.get(&position) else {
            error!(pipeline = %self.config.name, position, "No event recorded at cursor position");
            return;
        };

        match self.checkpoints.mark_processed(&self.config.name, event_id).await {
            Ok(()) => {
                state.cursor.clear_sequence();
                state.event_ids = state.event_ids.split_off(&(position + 1));
                self.stats.checkpoints.fetch_add(1, Ordering::Relaxed);
                debug!(pipeline = %self.config.name, event_id = %event_id, position, "Pipeline checkpointed");
            },
            Err(e) => {
                error!(
                    pipeline = %self.config.name,
                    event_id = %event_id,
                    error = %e,
                    "Checkpoint failed (will retry)"
                );
            },
        }
    }

    /// Let fetched elements finish, then flush the contiguous progress.
    async fn drain(
        &self,
        state: &mut RunState,
        workers: &mut JoinSet<()>,
        processor: &Arc<PipelineProcessor<EventElement>>,
        permits: &Arc<Semaphore>,
        released: &mut mpsc::UnboundedReceiver<EventElement>,
        processed: &mut mpsc::UnboundedReceiver<EventElement>,
    ) {
        let fetched = state.fetched;
        let outstanding = fetched - self.stats.settled();
        if outstanding > 0 {
            info!(pipeline = %self.config.name, outstanding, "Draining in-flight elements");
        }

        let settle = async {
            while self.stats.settled() < fetched {
                tokio::select! {
                    Some(element) = released.recv() => {
                        self.dispatch(workers, processor, permits, element);
                    }
                    Some(element) = processed.recv() => {
                        state.cursor.append(element.sequence_number());
                    }
                    Some(joined) = workers.join_next() => {
                        if let Err(e) = joined {
                            error!(pipeline = %self.config.name, error = %e, "Pipeline worker task failed");
                        }
                    }
                    else => break,
                }
            }
        };

        if tokio::time::timeout(self.config.drain_timeout, settle).await.is_err() {
            warn!(
                pipeline = %self.config.name,
                unfinished = fetched - self.stats.settled(),
                "Drain timed out, abandoning unfinished elements"
            );
            workers.abort_all();
        }

        while let Ok(element) = processed.try_recv() {
            state.cursor.append(element.sequence_number());
        }

        if state.cursor.sequence_length() > 0 {
            self.checkpoint(state).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use cairn_store::MemoryStore;

    #[test]
    fn test_stats_snapshot() {
        let stats = PipelineStats::default();
        stats.fetched.fetch_add(3, Ordering::Relaxed);
        stats.record_outcome(true);
        stats.record_outcome(false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.fetched, 3);
        assert_eq!(snapshot.processed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(stats.settled(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig { workers: 0, ..PipelineConfig::default() };

        let result =
            Pipeline::new(Arc::new(MemoryStore::new()), Arc::new(HandlerRegistry::new()), config);

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_empty_log_stops_cleanly() {
        let pipeline = Pipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(HandlerRegistry::new()),
            PipelineConfig::default(),
        )
        .unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let summary = pipeline.run(shutdown).await.unwrap();

        assert_eq!(summary, StatsSnapshot::default());
    }
}
