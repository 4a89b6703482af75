//! The same provisioning path over the TCP relay

use e2e_tests::TestBroker;
use message_bus::{RelayBus, RelayServer, DEFAULT_MAX_PAYLOAD};
use provisioner::ProvisionerSettings;
use std::sync::Arc;

#[tokio::test]
async fn test_provision_over_relay() {
    let server = RelayServer::bind("127.0.0.1:0", DEFAULT_MAX_PAYLOAD).await.unwrap();
    let address = server.local_addr().unwrap().to_string();
    let relay = tokio::spawn(server.run());

    let provisioner_bus = RelayBus::connect(&address, DEFAULT_MAX_PAYLOAD).await.unwrap();
    let node_bus = RelayBus::connect(&address, DEFAULT_MAX_PAYLOAD).await.unwrap();

    let settings = ProvisionerSettings::new("kv")
        .with_plan("free", false)
        .with_max_payload(DEFAULT_MAX_PAYLOAD);
    let mut broker = TestBroker::on_bus(Arc::new(provisioner_bus), settings).await.unwrap();
    let driver = broker.add_node_on(Arc::new(node_bus), "n1", 2).await.unwrap();

    let handle = broker.provisioner.provision_service("free", None).await.unwrap();
    assert_eq!(handle.node_id(), Some("n1"));
    assert_eq!(driver.instance_count(), 1);

    broker.shutdown();
    relay.abort();
}
