//! E2E tests for WebFinger discovery

mod common;

use common::TestServer;
use serde_json::Value;

#[tokio::test]
async fn test_webfinger_resolves_event_actor() {
    let server = TestServer::new().await;
    let event = server.create_test_event("xy2bqyz3").await;

    let response = server
        .client
        .get(&server.url(
            "/.well-known/webfinger?resource=acct:xy2bqyz3@events.test.example",
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["subject"], "acct:xy2bqyz3@events.test.example");

    let self_link = json["links"]
        .as_array()
        .unwrap()
        .iter()
        .find(|link| link["rel"] == "self")
        .expect("webfinger response has a self link");
    assert_eq!(self_link["type"], "application/activity+json");
    assert_eq!(self_link["href"], server.actor_uri(&event.id));
}

#[tokio::test]
async fn test_webfinger_unknown_event_is_404() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url(
            "/.well-known/webfinger?resource=acct:nosuchid@events.test.example",
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_foreign_domain_is_404() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;

    let response = server
        .client
        .get(&server.url("/.well-known/webfinger?resource=acct:xy2bqyz3@elsewhere.example"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_rejects_non_acct_resource() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/.well-known/webfinger?resource=https://events.test.example/xy2bqyz3"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}
