//! Lossless notification fan-out.
//!
//! Each subscriber gets its own unbounded channel, so a slow subscriber
//! never makes another one miss a notification. Subscribers that dropped
//! their receiver are pruned on the next raise.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

// =============================================================================
// Signal
// =============================================================================

/// Notification source with any number of subscribers.
pub struct Signal<E> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E: Clone> Signal<E> {
    /// Create a signal with no subscribers
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    /// Subscribe to notifications raised after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().push(sender);
        receiver
    }

    /// Deliver `value` to every live subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn raise(&self, value: E) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| s.send(value.clone()).is_ok());
        subscribers.len()
    }

    /// Number of subscribers still attached
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|s| !s.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<E>>> {
        // A panic while holding the lock can't leave the list half-updated
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E: Clone> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
