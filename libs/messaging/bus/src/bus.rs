//! # Message Bus Contract
//!
//! ## Purpose
//!
//! Subject-routed publish/subscribe with a correlated request/reply helper.
//! Delivery is at-most-once: a message published while nobody is subscribed
//! is dropped.
//!
//! ## Request/Reply
//!
//! ```text
//! request(subject, payload)
//!   1. inbox = new_inbox()           _INBOX.<uuid>
//!   2. subscribe(inbox)
//!   3. publish(subject, reply_to = inbox, payload)
//!   4. PendingRequest { subscription }
//!        .reply()         first reply, then unsubscribe
//!        .wait(timeout)   first reply or Timeout, always unsubscribe
//!        drop             unsubscribe
//! ```
//!
//! The reply subscription is tied to the lifetime of the [`PendingRequest`],
//! so a timed-out request can never consume a late reply.

use crate::error::Result;
use crate::request::PendingRequest;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Prefix of generated reply subjects
pub const INBOX_PREFIX: &str = "_INBOX";

/// One message as seen by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub subject: String,
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            reply_to: None,
            payload,
        }
    }

    pub fn with_reply(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Message routed to a subscription channel, tagged for multiplexing
#[derive(Debug, Clone)]
pub(crate) struct Delivery {
    pub(crate) tag: u64,
    pub(crate) message: BusMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

/// Removes a subscription from whatever bus created it
pub(crate) trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Ordered stream of messages matching one subject pattern.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriptionId,
    subject: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    owner: Arc<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        subject: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
        owner: Arc<dyn Unsubscribe>,
    ) -> Self {
        Self {
            id,
            subject: subject.into(),
            receiver,
            owner,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Next message, or `None` once the bus has closed the subscription
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.receiver.recv().await.map(|d| d.message)
    }

    /// Next message if one is already queued
    pub fn try_next(&mut self) -> Option<BusMessage> {
        self.receiver.try_recv().ok().map(|d| d.message)
    }
}

impl Stream for Subscription {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<BusMessage>> {
        self.receiver.poll_recv(cx).map(|d| d.map(|d| d.message))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.owner.unsubscribe(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Publish/subscribe transport with correlated request/reply
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Route one message to every matching subscription
    async fn send(&self, message: BusMessage) -> Result<()>;

    /// Subscribe to a subject pattern
    async fn subscribe(&self, subject: &str) -> Result<Subscription>;

    /// Remove a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);

    /// Fire-and-forget publish
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        self.send(BusMessage::new(subject, payload)).await
    }

    /// Publish carrying a reply subject
    async fn publish_request(&self, subject: &str, reply_to: &str, payload: Vec<u8>) -> Result<()> {
        self.send(BusMessage::new(subject, payload).with_reply(reply_to))
            .await
    }

    /// Unique transient reply subject
    fn new_inbox(&self) -> String {
        format!("{}.{}", INBOX_PREFIX, Uuid::new_v4().simple())
    }

    /// Send a correlated request; the reply subscription lives in the
    /// returned handle
    async fn request(&self, subject: &str, payload: Vec<u8>) -> Result<PendingRequest> {
        let inbox = self.new_inbox();
        let subscription = self.subscribe(&inbox).await?;
        self.publish_request(subject, &inbox, payload).await?;
        Ok(PendingRequest::new(subject, subscription))
    }

    /// First reply within `timeout`, or `BusError::Timeout`. The reply
    /// subscription is cancelled either way.
    async fn request_timeout(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<BusMessage> {
        self.request(subject, payload).await?.wait(timeout).await
    }
}

#[async_trait]
impl<B: MessageBus + ?Sized> MessageBus for Arc<B> {
    async fn send(&self, message: BusMessage) -> Result<()> {
        (**self).send(message).await
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        (**self).subscribe(subject).await
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }

    fn new_inbox(&self) -> String {
        (**self).new_inbox()
    }
}
