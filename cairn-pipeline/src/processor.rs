//! Pipeline Processor
//!
//! Runs the host's callback on one released element. A failing or panicking
//! callback is contained here: it is logged, the element is not reported as
//! processed, and the pipeline keeps going. The element's key is always
//! completed on the demultiplexer afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, trace, warn};

use crate::demux::Demultiplexer;
use crate::element::ProcessingElement;
use crate::signal::Signal;

/// Host callback applied to each element.
#[async_trait]
pub trait ElementProcessor<E>: Send + Sync + 'static {
    /// Process one element. An error leaves the element unprocessed.
    async fn process(&self, element: &E) -> anyhow::Result<()>;
}

/// Applies an [`ElementProcessor`] and raises `EventProcessed` on success.
pub struct PipelineProcessor<E: ProcessingElement> {
    handler: Arc<dyn ElementProcessor<E>>,
    demux: Arc<Demultiplexer<E>>,
    processed: Signal<E>,
}

impl<E: ProcessingElement> PipelineProcessor<E> {
    pub fn new(handler: Arc<dyn ElementProcessor<E>>, demux: Arc<Demultiplexer<E>>) -> Self {
        Self { handler, demux, processed: Signal::new() }
    }

    /// Receive every successfully processed element
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        self.processed.subscribe()
    }

    /// Process `element` and complete its key.
    ///
    /// Never fails; returns whether the handler succeeded.
    pub async fn process_next(&self, element: E) -> bool {
        let handler = self.handler.clone();
        let task_element = element.clone();

        // A separate task turns a handler panic into a JoinError
        let outcome = tokio::spawn(async move { handler.process(&task_element).await }).await;

        let succeeded = match outcome {
            Ok(Ok(())) => {
                trace!(
                    element_id = %element.unique_id(),
                    sequence = element.sequence_number(),
                    "Element processed"
                );
                self.processed.raise(element.clone());
                true
            },
            Ok(Err(e)) => {
                warn!(
                    element_id = %element.unique_id(),
                    sequence = element.sequence_number(),
                    error = %e,
                    "Element processing failed"
                );
                false
            },
            Err(e) => {
                error!(
                    element_id = %element.unique_id(),
                    sequence = element.sequence_number(),
                    error = %e,
                    "Element handler panicked"
                );
                false
            },
        };

        self.demux.complete(&element.grouping_key());
        succeeded
    }
}
