//! In-process bus
//!
//! Used when every component runs in one process, and by the tests. Routing
//! and size limits behave exactly like the relay transport.

use crate::bus::{BusMessage, MessageBus, Subscription, SubscriptionId, Unsubscribe};
use crate::error::{BusError, Result};
use crate::registry::SubscriptionRegistry;
use crate::subject;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Default maximum payload (1 MiB)
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

struct LocalInner {
    registry: SubscriptionRegistry,
    max_payload: usize,
}

impl Unsubscribe for LocalInner {
    fn unsubscribe(&self, id: SubscriptionId) {
        self.registry.remove(id);
    }
}

#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<LocalInner>,
}

impl LocalBus {
    pub fn new(max_payload: usize) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                registry: SubscriptionRegistry::new(),
                max_payload,
            }),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.inner.max_payload
    }

    /// Live subscription count
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn send(&self, message: BusMessage) -> Result<()> {
        subject::validate_subject(&message.subject)?;
        if message.payload.len() > self.inner.max_payload {
            return Err(BusError::PayloadTooLarge {
                size: message.payload.len(),
                max: self.inner.max_payload,
            });
        }
        let receivers = self.inner.registry.dispatch(&message);
        trace!(subject = %message.subject, receivers, "Published");
        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        subject::validate_pattern(subject)?;
        let id = self.inner.registry.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.registry.insert(id, subject, id.0, tx);
        Ok(Subscription::new(id, subject, rx, self.inner.clone()))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.registry.remove(id);
    }
}
