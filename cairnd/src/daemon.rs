//! Daemon: wires a store, an element processor and one named pipeline.
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Open the store (PostgreSQL when configured, in-memory otherwise)
//! 3. Run the pipeline from its last checkpoint
//! 4. Graceful shutdown on SIGINT: drain in-flight elements, flush a checkpoint

use std::sync::Arc;

use async_trait::async_trait;
use cairn_eventlog::EventLog;
use cairn_pipeline::{ElementProcessor, EventElement, HandlerRegistry, Pipeline, StatsSnapshot};
use cairn_store::{MemoryStore, Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::DaemonResult;

// =============================================================================
// Event tracer
// =============================================================================

/// Runs the registered handlers, then traces each consumed event.
pub struct EventTracer {
    registry: HandlerRegistry,
}

impl EventTracer {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ElementProcessor<EventElement> for EventTracer {
    async fn process(&self, element: &EventElement) -> anyhow::Result<()> {
        self.registry.process(element).await?;

        let record = element.record();
        info!(
            global_seq = record.global_seq,
            stream_id = %record.stream_id,
            stream_seq = record.stream_seq,
            type_tag = %record.type_tag,
            "Event consumed"
        );
        Ok(())
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// The Cairn daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<S>,
    /// Processor applied to every event
    processor: Arc<dyn ElementProcessor<EventElement>>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon over a fresh in-memory store (for testing/development).
    pub fn new_memory(config: Config) -> Self {
        let processor = Arc::new(EventTracer::new(HandlerRegistry::new()));
        Self::new(config, Arc::new(MemoryStore::new()), processor)
    }
}

#[cfg(feature = "postgres")]
impl Daemon<cairn_store::PgStore> {
    /// Connect to `DATABASE_URL` and create a daemon over PostgreSQL.
    pub async fn connect(config: Config) -> DaemonResult<Self> {
        let database_url = config.database_url.clone().ok_or_else(|| {
            crate::error::DaemonError::Config("DATABASE_URL is required".to_string())
        })?;

        let store = cairn_store::PgStore::connect(&database_url).await?;
        let processor = Arc::new(EventTracer::new(HandlerRegistry::new()));
        Ok(Self::new(config, Arc::new(store), processor))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a new daemon with provided components.
    pub fn new(
        config: Config,
        store: Arc<S>,
        processor: Arc<dyn ElementProcessor<EventElement>>,
    ) -> Self {
        Self { config, store, processor }
    }

    /// Event log over the daemon's store
    pub fn event_log(&self) -> EventLog<S> {
        EventLog::new(self.store.clone())
    }

    /// Run the daemon.
    ///
    /// Blocks until SIGINT, then drains the pipeline.
    pub async fn run(self) -> DaemonResult<StatsSnapshot> {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();

        tokio::spawn(watch_ctrl_c(tokio::signal::ctrl_c(), trigger));

        self.run_until(shutdown).await
    }

    /// Run the daemon until `shutdown` is cancelled.
    pub async fn run_until(self, shutdown: CancellationToken) -> DaemonResult<StatsSnapshot> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            pipeline = %self.config.pipeline.name,
            "Starting Cairn daemon"
        );

        let pipeline =
            Pipeline::new(self.store.clone(), self.processor.clone(), self.config.pipeline.clone())?;
        let summary = pipeline.run(shutdown).await?;

        info!("Cairn daemon stopped");
        Ok(summary)
    }
}

/// Cancel `trigger` once `signal` fires.
///
/// If the listener can't be installed the daemon keeps running; it then
/// stops only through its token.
async fn watch_ctrl_c<F>(signal: F, trigger: CancellationToken)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            trigger.cancel();
        },
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
