//! TCP relay transport
//!
//! ```text
//! node process ──RelayBus──┐
//!                           ├──► RelayServer (bus_relay) ──► subscription registry
//! provisioner ───RelayBus──┘
//! ```
//!
//! Same contract as [`crate::LocalBus`] across process boundaries.

pub mod client;
pub mod frame;
pub mod server;

pub use client::RelayBus;
pub use frame::{Frame, FRAME_OVERHEAD};
pub use server::RelayServer;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use std::time::Duration;

    async fn start_relay() -> String {
        let server = RelayServer::bind("127.0.0.1:0", 1024).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());
        address
    }

    #[tokio::test]
    async fn test_request_reply_across_connections() {
        let address = start_relay().await;
        let node = RelayBus::connect(&address, 1024).await.unwrap();
        let broker = RelayBus::connect(&address, 1024).await.unwrap();

        let mut requests = node.subscribe("kv.provision.*").await.unwrap();
        let responder = node.clone();
        tokio::spawn(async move {
            while let Some(msg) = requests.next().await {
                let reply_to = msg.reply_to.unwrap();
                responder.publish(&reply_to, b"done".to_vec()).await.unwrap();
            }
        });

        let reply = broker
            .request_timeout("kv.provision.n1", b"{}".to_vec(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.payload, b"done");
    }

    #[tokio::test]
    async fn test_unsubscribed_client_receives_nothing() {
        let address = start_relay().await;
        let listener = RelayBus::connect(&address, 1024).await.unwrap();
        let publisher = RelayBus::connect(&address, 1024).await.unwrap();

        let sub = listener.subscribe("kv.announce").await.unwrap();
        let mut other = listener.subscribe("kv.discover").await.unwrap();
        drop(sub);
        listener.flush().await.unwrap();

        publisher.publish("kv.announce", b"a".to_vec()).await.unwrap();
        publisher.publish("kv.discover", b"d".to_vec()).await.unwrap();

        let msg = other.next().await.unwrap();
        assert_eq!(msg.subject, "kv.discover");
    }

    #[tokio::test]
    async fn test_client_enforces_payload_limit() {
        let address = start_relay().await;
        let bus = RelayBus::connect(&address, 8).await.unwrap();
        assert!(bus.publish("a.b", vec![0; 9]).await.is_err());
    }
}
