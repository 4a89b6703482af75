//! # Relay Server
//!
//! Routes frames between bus clients in separate processes. Each connection
//! gets a reader loop (subscribe/unsubscribe/publish/ping) and a writer task
//! (deliveries and pongs). All subscriptions of one connection share the
//! connection's outbound channel; deliveries are tagged with the client's
//! subscription id.

use super::frame::{read_frame, write_frame, Frame, FRAME_OVERHEAD};
use crate::bus::{BusMessage, Delivery, SubscriptionId};
use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::subject;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub type ConnectionId = u64;

pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<SubscriptionRegistry>,
    max_payload: usize,
    connection_counter: AtomicU64,
}

impl RelayServer {
    pub async fn bind(address: &str, max_payload: usize) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        info!(address, max_payload, "Relay listening");
        Ok(Self {
            listener,
            registry: Arc::new(SubscriptionRegistry::new()),
            max_payload,
            connection_counter: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let connection_id = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                    info!(connection_id, %peer, "Relay client connected");
                    let registry = self.registry.clone();
                    let max_payload = self.max_payload;
                    tokio::spawn(async move {
                        handle_connection(stream, connection_id, registry, max_payload).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept relay connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    connection_id: ConnectionId,
    registry: Arc<SubscriptionRegistry>,
    max_payload: usize,
) {
    let (mut read_stream, mut write_stream) = stream.into_split();
    let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel::<Delivery>();
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Frame>();

    let write_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(delivery) = delivery_rx.recv() => Frame::Deliver {
                    sid: delivery.tag,
                    subject: delivery.message.subject,
                    reply_to: delivery.message.reply_to,
                    payload: delivery.message.payload,
                },
                Some(frame) = control_rx.recv() => frame,
                else => break,
            };
            if let Err(e) = write_frame(&mut write_stream, &frame).await {
                warn!(connection_id, "Failed to write to relay client: {}", e);
                break;
            }
        }
    });

    let mut subscriptions: HashMap<u64, SubscriptionId> = HashMap::new();
    let max_frame = max_payload + FRAME_OVERHEAD;

    loop {
        let frame = match read_frame(&mut read_stream, max_frame).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(connection_id, "Relay client closed connection");
                break;
            }
            Err(e) => {
                warn!(connection_id, "Relay read error: {}", e);
                break;
            }
        };

        match frame {
            Frame::Subscribe { sid, subject: pattern } => {
                if let Err(e) = subject::validate_pattern(&pattern) {
                    warn!(connection_id, sid, "Rejected subscription: {}", e);
                    continue;
                }
                let id = registry.next_id();
                registry.insert(id, &pattern, sid, delivery_tx.clone());
                if let Some(previous) = subscriptions.insert(sid, id) {
                    registry.remove(previous);
                }
            }
            Frame::Unsubscribe { sid } => {
                if let Some(id) = subscriptions.remove(&sid) {
                    registry.remove(id);
                }
            }
            Frame::Publish {
                subject: target,
                reply_to,
                payload,
            } => {
                if payload.len() > max_payload {
                    warn!(connection_id, subject = %target, size = payload.len(), "Dropped oversized publish");
                    continue;
                }
                if let Err(e) = subject::validate_subject(&target) {
                    warn!(connection_id, "Dropped publish: {}", e);
                    continue;
                }
                registry.dispatch(&BusMessage {
                    subject: target,
                    reply_to,
                    payload,
                });
            }
            Frame::Ping { id } => {
                let _ = control_tx.send(Frame::Pong { id });
            }
            Frame::Deliver { .. } | Frame::Pong { .. } => {
                warn!(connection_id, "Ignoring server-bound frame from client");
            }
        }
    }

    for (_, id) in subscriptions.drain() {
        registry.remove(id);
    }
    write_task.abort();
    info!(connection_id, "Relay client disconnected");
}
