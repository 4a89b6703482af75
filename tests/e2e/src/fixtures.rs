//! Broker fixtures

use gateway::{Gateway, GatewaySettings, MemoryDirectory};
use message_bus::{LocalBus, MessageBus};
use node::{MemoryDriver, Node, NodeSettings};
use provisioner::{Provisioner, ProvisionerSettings};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const SERVICE: &str = "kv";
pub const LABEL: &str = "kv-1.0";
pub const TOKEN: &str = "e2e-token";

static LOGGING: Once = Once::new();

/// Route test logs through the libtest writer; honours `RUST_LOG`
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub struct TestNode {
    pub driver: Arc<MemoryDriver>,
    pub node: Node,
}

/// A provisioner plus any number of in-memory nodes sharing one bus
pub struct TestBroker {
    pub bus: Arc<dyn MessageBus>,
    pub provisioner: Arc<Provisioner>,
    pub nodes: Vec<TestNode>,
    max_payload: usize,
}

impl TestBroker {
    /// Provisioner on a fresh `LocalBus` with the `free` plan
    pub async fn local() -> anyhow::Result<Self> {
        Self::with_settings(ProvisionerSettings::new(SERVICE).with_plan("free", false)).await
    }

    pub async fn with_settings(settings: ProvisionerSettings) -> anyhow::Result<Self> {
        let bus = LocalBus::new(settings.max_payload);
        Self::on_bus(Arc::new(bus), settings).await
    }

    pub async fn on_bus(bus: Arc<dyn MessageBus>, settings: ProvisionerSettings) -> anyhow::Result<Self> {
        init_test_logging();
        let max_payload = settings.max_payload;
        let provisioner = Arc::new(Provisioner::new(bus.clone(), settings));
        provisioner.start().await?;
        Ok(Self {
            bus,
            provisioner,
            nodes: Vec::new(),
            max_payload,
        })
    }

    pub async fn add_node(&mut self, node_id: &str, capacity: i64) -> anyhow::Result<Arc<MemoryDriver>> {
        self.add_node_on(self.bus.clone(), node_id, capacity).await
    }

    /// Start a node on `bus`, which may be a separate connection to the same
    /// relay
    pub async fn add_node_on(
        &mut self,
        bus: Arc<dyn MessageBus>,
        node_id: &str,
        capacity: i64,
    ) -> anyhow::Result<Arc<MemoryDriver>> {
        let driver = Arc::new(MemoryDriver::new(node_id));
        let settings = NodeSettings::new(node_id, "free")
            .with_capacity(capacity)
            .with_max_payload(self.max_payload);
        let node = Node::new(bus, driver.clone(), settings);
        node.start().await?;
        self.nodes.push(TestNode {
            driver: driver.clone(),
            node,
        });
        settle().await;
        Ok(driver)
    }

    pub fn node(&self, node_id: &str) -> Option<&TestNode> {
        self.nodes.iter().find(|n| n.node.id() == node_id)
    }

    /// Gateway over this provisioner with an in-memory directory, handles
    /// already loaded
    pub async fn gateway(&self, request_timeout: Duration) -> anyhow::Result<(Arc<Gateway>, Arc<MemoryDirectory>)> {
        let directory = Arc::new(MemoryDirectory::new());
        let settings = GatewaySettings::new(LABEL, TOKEN)
            .with_request_timeout(request_timeout)
            .with_double_check_delay(Duration::from_secs(1));
        let gateway = Arc::new(Gateway::new(self.provisioner.clone(), directory.clone(), settings));
        gateway.refresh_handles().await?;
        Ok((gateway, directory))
    }

    pub fn shutdown(&self) {
        for node in &self.nodes {
            node.node.shutdown();
        }
        self.provisioner.shutdown();
    }
}
