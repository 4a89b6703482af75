//! Two-phase orphan reconciliation across real nodes

use e2e_tests::{settle, TestBroker};
use std::collections::BTreeMap;

#[tokio::test(start_paused = true)]
async fn test_zero_nodes_yield_empty_sets() {
    let broker = TestBroker::local().await.unwrap();

    broker.provisioner.check_orphan(&[]).await.unwrap();
    settle().await;
    let final_set = broker.provisioner.double_check_orphan(&[]).unwrap();

    assert!(final_set.is_empty());
    assert!(broker.provisioner.orphan_report().staging.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_instance_created_between_snapshots_is_not_orphan() {
    let mut broker = TestBroker::local().await.unwrap();
    let driver = broker.add_node("n1", 10).await.unwrap();
    driver.adopt_instance("stray");

    let before = broker.provisioner.handles_snapshot();
    let fresh = broker.provisioner.provision_service("free", None).await.unwrap();

    broker.provisioner.check_orphan(&before).await.unwrap();
    settle().await;
    let staging = broker.provisioner.orphan_report().staging;
    assert_eq!(staging.instance_count(), 2);

    let after = broker.provisioner.handles_snapshot();
    let final_set = broker.provisioner.double_check_orphan(&after).unwrap();
    assert_eq!(final_set.instances["n1"], vec!["stray".to_string()]);
    assert!(!final_set.instances["n1"].contains(&fresh.service_id));
}

#[tokio::test(start_paused = true)]
async fn test_purge_removes_final_orphans_only() {
    let mut broker = TestBroker::local().await.unwrap();
    let driver = broker.add_node("n1", 10).await.unwrap();
    let kept = broker.provisioner.provision_service("free", None).await.unwrap();
    driver.adopt_instance("stray");

    let known = broker.provisioner.handles_snapshot();
    broker.provisioner.check_orphan(&known).await.unwrap();
    settle().await;
    let final_set = broker.provisioner.double_check_orphan(&known).unwrap();

    let published = broker
        .provisioner
        .purge_orphan(&final_set.instances, &BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(published, 1);
    settle().await;

    assert!(!driver.has_instance("stray"));
    assert!(driver.has_instance(&kept.service_id));
}
