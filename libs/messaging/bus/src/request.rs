//! Correlated request handle
//!
//! Pairs the reply subscription with its deadline. Whichever of the reply
//! or the timer comes first, the subscription is gone afterwards.

use crate::bus::{BusMessage, Subscription};
use crate::error::{BusError, Result};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct PendingRequest {
    subject: String,
    subscription: Subscription,
}

impl PendingRequest {
    pub(crate) fn new(subject: impl Into<String>, subscription: Subscription) -> Self {
        Self {
            subject: subject.into(),
            subscription,
        }
    }

    /// Subject the request was sent to
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Inbox the reply is expected on
    pub fn reply_subject(&self) -> &str {
        self.subscription.subject()
    }

    /// Wait for the first reply without a deadline
    pub async fn reply(mut self) -> Result<BusMessage> {
        self.subscription
            .next()
            .await
            .ok_or_else(|| BusError::closed(format!("reply subscription for '{}' closed", self.subject)))
    }

    /// Wait for the first reply for at most `timeout`
    pub async fn wait(self, timeout: Duration) -> Result<BusMessage> {
        let subject = self.subject.clone();
        match tokio::time::timeout(timeout, self.reply()).await {
            Ok(result) => result,
            Err(_) => {
                debug!(subject = %subject, ?timeout, "Request timed out, reply subscription cancelled");
                Err(BusError::timeout(subject))
            }
        }
    }

    /// Abandon the request
    pub fn cancel(self) {}
}
