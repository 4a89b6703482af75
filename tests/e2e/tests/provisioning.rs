//! Scheduling and lifecycle through the provisioner

use e2e_tests::{settle, TestBroker};
use message_bus::MessageBus;
use provisioner::ProvisionerSettings;
use serde_json::json;
use std::time::Duration;
use types::codes;

#[tokio::test(start_paused = true)]
async fn test_request_lands_on_highest_scoring_node() {
    let mut broker = TestBroker::local().await.unwrap();
    let n1 = broker.add_node("n1", 1).await.unwrap();
    let n2 = broker.add_node("n2", 2).await.unwrap();

    let handle = broker.provisioner.provision_service("free", None).await.unwrap();
    assert_eq!(handle.node_id(), Some("n2"));
    assert_eq!(n2.instance_count(), 1);
    assert_eq!(n1.instance_count(), 0);

    settle().await;
    assert_eq!(broker.node("n2").unwrap().node.capacity(), 1);
    assert_eq!(broker.node("n1").unwrap().node.capacity(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_capacity_is_conserved_over_a_full_lifecycle() {
    let mut broker = TestBroker::local().await.unwrap();
    let driver = broker.add_node("n1", 3).await.unwrap();

    let instance = broker.provisioner.provision_service("free", None).await.unwrap();
    assert_eq!(broker.node("n1").unwrap().node.capacity(), 2);

    let binding = broker
        .provisioner
        .bind_instance(&instance.service_id, json!({"role": "reader"}))
        .await
        .unwrap();
    assert_eq!(driver.binding_count(), 1);

    let evicted = broker
        .provisioner
        .unprovision_service(&instance.service_id)
        .await
        .unwrap();
    assert!(evicted.contains(&binding.service_id));
    assert_eq!(broker.node("n1").unwrap().node.capacity(), 3);
    assert_eq!(driver.instance_count(), 0);

    let err = broker
        .provisioner
        .unbind_instance(&instance.service_id, &binding.service_id)
        .await
        .unwrap_err();
    assert!(err.is(codes::NOT_FOUND));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_fleet_rejects_provisioning() {
    let mut broker = TestBroker::local().await.unwrap();
    broker.add_node("n1", 0).await.unwrap();

    let err = broker.provisioner.provision_service("free", None).await.unwrap_err();
    assert!(err.is(codes::NO_NODE_AVAILABLE));
    assert!(broker.provisioner.handles_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_silent_node_times_out_without_leaking_state() {
    let settings = ProvisionerSettings::new("kv")
        .with_plan("free", false)
        .with_node_timeout(Duration::from_millis(500));
    let broker = TestBroker::with_settings(settings).await.unwrap();

    // Answers discovery, never answers provision
    let mut silent = broker.bus.subscribe("kv.>").await.unwrap();
    let responder = broker.bus.clone();
    tokio::spawn(async move {
        while let Some(msg) = silent.next().await {
            if msg.subject != "kv.discover" {
                continue;
            }
            if let Some(reply_to) = msg.reply_to {
                let announcement = types::NodeAnnouncement::new("silent", "free", 10);
                let _ = responder
                    .publish(&reply_to, serde_json::to_vec(&announcement).unwrap())
                    .await;
            }
        }
    });

    let started = tokio::time::Instant::now();
    let err = broker.provisioner.provision_service("free", None).await.unwrap_err();
    assert!(err.is(codes::GATEWAY_TIMEOUT));
    assert!(started.elapsed() <= Duration::from_millis(2_600));
    assert!(broker.provisioner.handles_snapshot().is_empty());
}
