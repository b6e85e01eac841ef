//! E2E tests for ActivityPub endpoints
//!
//! Actor documents, collections, the logged-message endpoint and the
//! shared inbox's authentication gate. Full signed-delivery round trips
//! need routable remote hosts and are covered at the unit level in the
//! federation modules.

mod common;

use common::TestServer;
use serde_json::Value;

// =============================================================================
// Actor document
// =============================================================================

#[tokio::test]
async fn test_actor_document_shape() {
    let server = TestServer::new().await;
    let event = server.create_test_event("xy2bqyz3").await;

    let response = server
        .client
        .get(&server.url("/xy2bqyz3"))
        .header("Accept", "application/activity+json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();

    assert_eq!(json["type"], "Person");
    assert_eq!(json["id"], server.actor_uri("xy2bqyz3"));
    assert_eq!(json["preferredUsername"], "xy2bqyz3");
    assert_eq!(json["name"], event.name);
    assert_eq!(
        json["inbox"],
        format!("{}/activitypub/inbox", server.base_url())
    );
    assert_eq!(json["publicKey"]["owner"], server.actor_uri("xy2bqyz3"));
    assert_eq!(
        json["publicKey"]["id"],
        format!("{}#main-key", server.actor_uri("xy2bqyz3"))
    );
    assert_eq!(json["publicKey"]["publicKeyPem"], event.public_key_pem);
}

#[tokio::test]
async fn test_actor_document_unknown_event_is_404() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/nosuchid"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

// =============================================================================
// Collections
// =============================================================================

#[tokio::test]
async fn test_followers_collection_lists_followers() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;
    server
        .add_follower(
            "xy2bqyz3",
            "https://remote.example/users/alice",
            "https://remote.example/follows/1",
        )
        .await;

    let response = server
        .client
        .get(&server.url("/xy2bqyz3/followers"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["type"], "OrderedCollection");
    assert_eq!(json["totalItems"], 1);
    assert_eq!(
        json["orderedItems"][0],
        "https://remote.example/users/alice"
    );
}

#[tokio::test]
async fn test_featured_collection_pins_event_object() {
    let server = TestServer::new().await;
    let event = server.create_test_event("xy2bqyz3").await;

    let response = server
        .client
        .get(&server.url("/xy2bqyz3/featured"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["type"], "OrderedCollection");
    assert_eq!(json["orderedItems"][0]["type"], "Event");
    assert_eq!(json["orderedItems"][0]["id"], event.activity_object_id);
}

// =============================================================================
// Logged message retrieval
// =============================================================================

#[tokio::test]
async fn test_logged_message_is_served_verbatim() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;

    let message_id = format!("{}/xy2bqyz3/m/deadbeef", server.base_url());
    let content = serde_json::json!({
        "id": message_id,
        "type": "Create",
        "actor": server.actor_uri("xy2bqyz3"),
        "to": ["https://remote.example/users/alice"],
        "object": { "type": "Note", "content": "hello" }
    });
    server.log_message("xy2bqyz3", &message_id, content.clone()).await;

    let response = server
        .client
        .get(&server.url("/xy2bqyz3/m/deadbeef"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json, content);
}

#[tokio::test]
async fn test_unknown_message_is_404() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;

    let response = server
        .client
        .get(&server.url("/xy2bqyz3/m/0000000000000000"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

// =============================================================================
// Inbox authentication gate
// =============================================================================

#[tokio::test]
async fn test_inbox_rejects_unsigned_requests() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;

    let activity = serde_json::json!({
        "type": "Follow",
        "id": "https://remote.example/follows/1",
        "actor": "https://remote.example/users/alice",
        "object": server.actor_uri("xy2bqyz3")
    });

    let response = server
        .client
        .post(&server.url("/activitypub/inbox"))
        .header("Content-Type", "application/activity+json")
        .json(&activity)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_inbox_rejects_key_id_for_different_actor() {
    let server = TestServer::new().await;
    server.create_test_event("xy2bqyz3").await;

    let activity = serde_json::json!({
        "type": "Follow",
        "id": "https://remote.example/follows/1",
        "actor": "https://remote.example/users/alice",
        "object": server.actor_uri("xy2bqyz3")
    });

    // Signed, but the keyId claims a different actor than the activity.
    let signature_header = concat!(
        "keyId=\"https://evil.example/users/mallory#main-key\",",
        "algorithm=\"rsa-sha256\",",
        "headers=\"(request-target) host date digest\",",
        "signature=\"AAAA\""
    );

    let response = server
        .client
        .post(&server.url("/activitypub/inbox"))
        .header("Content-Type", "application/activity+json")
        .header("Signature", signature_header)
        .json(&activity)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_inbox_rejects_activity_without_actor() {
    let server = TestServer::new().await;

    let signature_header = concat!(
        "keyId=\"https://remote.example/users/alice#main-key\",",
        "algorithm=\"rsa-sha256\",",
        "headers=\"(request-target) host date digest\",",
        "signature=\"AAAA\""
    );

    let response = server
        .client
        .post(&server.url("/activitypub/inbox"))
        .header("Content-Type", "application/activity+json")
        .header("Signature", signature_header)
        .json(&serde_json::json!({ "type": "Follow" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}
