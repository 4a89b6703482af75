//! Subscription registry shared by the in-process bus and the relay server
//!
//! Each entry maps a subscription id to its pattern and the channel that
//! receives matching messages. The relay server points every subscription of
//! one connection at the connection's outbound channel and tags deliveries
//! with the client-side subscription id.

use crate::bus::{BusMessage, Delivery, SubscriptionId};
use crate::subject;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

struct Entry {
    pattern: String,
    tag: u64,
    sender: mpsc::UnboundedSender<Delivery>,
}

pub(crate) struct SubscriptionRegistry {
    next_id: AtomicU64,
    entries: DashMap<SubscriptionId, Entry>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: DashMap::new(),
        }
    }

    pub(crate) fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(
        &self,
        id: SubscriptionId,
        pattern: &str,
        tag: u64,
        sender: mpsc::UnboundedSender<Delivery>,
    ) {
        self.entries.insert(
            id,
            Entry {
                pattern: pattern.to_string(),
                tag,
                sender,
            },
        );
        debug!(subscription = id.0, pattern, "Subscribed");
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.entries.remove(&id).is_some();
        if removed {
            debug!(subscription = id.0, "Unsubscribed");
        }
        removed
    }

    /// Deliver to every matching subscription; returns the receiver count
    pub(crate) fn dispatch(&self, message: &BusMessage) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in self.entries.iter() {
            if !subject::matches(&entry.pattern, &message.subject) {
                continue;
            }
            let delivery = Delivery {
                tag: entry.tag,
                message: message.clone(),
            };
            if entry.sender.send(delivery).is_ok() {
                delivered += 1;
            } else {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            self.entries.remove(&id);
        }
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
