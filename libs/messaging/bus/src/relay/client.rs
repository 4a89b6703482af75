//! Relay client implementing [`MessageBus`] over one TCP connection
//!
//! A writer task drains the outbound frame queue; a reader task routes
//! `Deliver` frames to subscription channels by `sid` and completes pings.
//! `subscribe` returns only after the relay has registered the subscription,
//! so a request published right after can never miss its reply.

use super::frame::{read_frame, write_frame, Frame, FRAME_OVERHEAD};
use crate::bus::{BusMessage, Delivery, MessageBus, Subscription, SubscriptionId, Unsubscribe};
use crate::error::{BusError, Result};
use crate::subject;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct RelayInner {
    outbound: mpsc::UnboundedSender<Frame>,
    subscriptions: DashMap<u64, mpsc::UnboundedSender<Delivery>>,
    pings: DashMap<u64, oneshot::Sender<()>>,
    next_id: AtomicU64,
    max_payload: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayInner {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| BusError::closed("relay connection closed"))
    }
}

impl Unsubscribe for RelayInner {
    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscriptions.remove(&id.0).is_some() {
            let _ = self.outbound.send(Frame::Unsubscribe { sid: id.0 });
        }
    }
}

impl Drop for RelayInner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct RelayBus {
    inner: Arc<RelayInner>,
}

impl RelayBus {
    pub async fn connect(address: &str, max_payload: usize) -> Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| BusError::transport(format!("failed to connect to relay {}: {}", address, e)))?;
        stream.set_nodelay(true)?;
        info!(address, "Connected to bus relay");

        let (mut read_stream, mut write_stream) = stream.into_split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();

        let inner = Arc::new(RelayInner {
            outbound: outbound_tx,
            subscriptions: DashMap::new(),
            pings: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_payload,
            tasks: Mutex::new(Vec::new()),
        });

        let write_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = write_frame(&mut write_stream, &frame).await {
                    warn!("Failed to write to bus relay: {}", e);
                    break;
                }
            }
        });

        // The reader holds a weak reference so dropping the last RelayBus
        // clone tears the connection down.
        let weak = Arc::downgrade(&inner);
        let max_frame = max_payload + FRAME_OVERHEAD;
        let read_task = tokio::spawn(async move {
            loop {
                let frame = match read_frame(&mut read_stream, max_frame).await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        debug!("Bus relay closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Bus relay read error: {}", e);
                        break;
                    }
                };
                let Some(inner) = weak.upgrade() else { break };
                match frame {
                    Frame::Deliver {
                        sid,
                        subject,
                        reply_to,
                        payload,
                    } => {
                        if let Some(sender) = inner.subscriptions.get(&sid) {
                            let _ = sender.send(Delivery {
                                tag: sid,
                                message: BusMessage {
                                    subject,
                                    reply_to,
                                    payload,
                                },
                            });
                        }
                    }
                    Frame::Pong { id } => {
                        if let Some((_, waiter)) = inner.pings.remove(&id) {
                            let _ = waiter.send(());
                        }
                    }
                    other => warn!(?other, "Unexpected frame from bus relay"),
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.subscriptions.clear();
                inner.pings.clear();
            }
        });

        inner.tasks.lock().extend([write_task, read_task]);
        Ok(Self { inner })
    }

    /// Wait until the relay has processed every frame sent so far
    pub async fn flush(&self) -> Result<()> {
        let id = self.inner.next_id();
        let (tx, rx) = oneshot::channel();
        self.inner.pings.insert(id, tx);
        self.inner.send_frame(Frame::Ping { id })?;
        rx.await.map_err(|_| BusError::closed("relay connection closed before flush"))
    }
}

#[async_trait]
impl MessageBus for RelayBus {
    async fn send(&self, message: BusMessage) -> Result<()> {
        subject::validate_subject(&message.subject)?;
        if message.payload.len() > self.inner.max_payload {
            return Err(BusError::PayloadTooLarge {
                size: message.payload.len(),
                max: self.inner.max_payload,
            });
        }
        self.inner.send_frame(Frame::Publish {
            subject: message.subject,
            reply_to: message.reply_to,
            payload: message.payload,
        })
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription> {
        subject::validate_pattern(subject)?;
        let sid = self.inner.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscriptions.insert(sid, tx);
        let subscription = Subscription::new(SubscriptionId(sid), subject, rx, self.inner.clone());
        self.inner.send_frame(Frame::Subscribe {
            sid,
            subject: subject.to_string(),
        })?;
        self.flush().await?;
        Ok(subscription)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        Unsubscribe::unsubscribe(self.inner.as_ref(), id);
    }
}
