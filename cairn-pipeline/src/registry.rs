//! Event handler registry
//!
//! Routes each element to the handler registered for its type tag.
//! Tags without a handler are skipped and count as processed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cairn_domain::EventRecord;
use tracing::{debug, warn};

use crate::element::EventElement;
use crate::processor::ElementProcessor;

/// Handler for one kind of event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventRecord) -> anyhow::Result<()>;
}

/// Adapter for plain functions
struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventRecord) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &EventRecord) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Type tag → handler table, built at startup.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `type_tag`, replacing any previous one
    pub fn register(
        &mut self,
        type_tag: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        let type_tag = type_tag.into();
        if self.handlers.insert(type_tag.clone(), handler).is_some() {
            warn!(type_tag = %type_tag, "Replacing previously registered handler");
        }
        self
    }

    /// Register a synchronous function for `type_tag`
    pub fn register_fn<F>(&mut self, type_tag: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&EventRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(type_tag, Arc::new(FnHandler(f)))
    }

    pub fn handler_for(&self, type_tag: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(type_tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[async_trait]
impl ElementProcessor<EventElement> for HandlerRegistry {
    async fn process(&self, element: &EventElement) -> anyhow::Result<()> {
        let record = element.record();
        match self.handler_for(&record.type_tag) {
            Some(handler) => handler.handle(record).await,
            None => {
                debug!(
                    type_tag = %record.type_tag,
                    event_id = %record.event_id,
                    "No handler registered, skipping"
                );
                Ok(())
            },
        }
    }
}
