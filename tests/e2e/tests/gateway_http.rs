//! HTTP requests through the gateway into real nodes

use e2e_tests::fixtures::{LABEL, TOKEN};
use e2e_tests::TestBroker;
use gateway::{routes, TOKEN_HEADER};
use serde_json::{json, Value};
use std::time::Duration;
use types::credentials::{NAME, NODE_ID};
use warp::http::StatusCode;

async fn call(
    filter: &(impl warp::Filter<Extract = (warp::reply::Response,), Error = std::convert::Infallible>
          + Clone
          + 'static),
    method: &str,
    path: &str,
    body: Value,
) -> (StatusCode, Value) {
    let response = warp::test::request()
        .method(method)
        .path(path)
        .header(TOKEN_HEADER, TOKEN)
        .header("content-type", "application/json")
        .body(body.to_string())
        .reply(filter)
        .await;
    let json = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
    (response.status(), json)
}

#[tokio::test(start_paused = true)]
async fn test_provision_and_bind_over_http() {
    let mut broker = TestBroker::local().await.unwrap();
    let driver = broker.add_node("n1", 4).await.unwrap();
    let (gateway, _directory) = broker.gateway(Duration::from_secs(5)).await.unwrap();
    let filter = routes(gateway);

    let (status, body) = call(
        &filter,
        "POST",
        "/gateway/v1/configurations",
        json!({"label": LABEL, "plan": "free"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let instance_id = body["service_id"].as_str().unwrap().to_string();
    assert!(driver.has_instance(&instance_id));

    let (status, body) = call(
        &filter,
        "POST",
        &format!("/gateway/v1/configurations/{}/handles", instance_id),
        json!({"service_id": instance_id, "label": LABEL}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credentials"][NAME], instance_id.as_str());
    assert_eq!(driver.binding_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recover_moves_instance_and_bindings() {
    let mut broker = TestBroker::local().await.unwrap();
    let old = broker.add_node("n1", 4).await.unwrap();
    let instance = broker.provisioner.provision_service("free", None).await.unwrap();
    let binding = broker
        .provisioner
        .bind_instance(&instance.service_id, json!({}))
        .await
        .unwrap();
    broker.node("n1").unwrap().node.shutdown();
    let new = broker.add_node("n2", 4).await.unwrap();

    let (gateway, _directory) = broker.gateway(Duration::from_secs(10)).await.unwrap();
    let filter = routes(gateway);
    let (status, body) = call(
        &filter,
        "POST",
        "/service/internal/v1/recover",
        json!({
            "instance_id": instance.service_id,
            "backup_path": "/backups/db",
            "handles": [instance, binding],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let handles = body["handles"].as_array().unwrap();
    assert_eq!(handles.len(), 2);
    assert_eq!(handles[0]["credentials"][NODE_ID], "n2");
    assert!(new.has_instance(&instance.service_id));
    assert_eq!(new.binding_count(), 1);
    assert_eq!(old.instance_count(), 1);
}
