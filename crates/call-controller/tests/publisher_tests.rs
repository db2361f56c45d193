//! Integration tests for the business-event fan-out.
//!
//! Uses wiremock receivers to verify the wire contract: per-endpoint
//! signatures, the header set, and the query parameters. The database pool
//! is lazy and never connected - the success path records no failure rows.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use call_controller::config::WebhookEndpoint;
use call_controller::services::EventPublisher;
use common::secret::SecretString;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn lazy_pool() -> PgPool {
    PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/call_test")
        .expect("lazy pool")
}

fn endpoint(url: String, secret: &str) -> WebhookEndpoint {
    WebhookEndpoint {
        url,
        secret: SecretString::from(secret),
        timeout: 5,
    }
}

fn header(request: &Request, name: &str) -> String {
    request
        .headers
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
        .to_string()
}

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    for _ in 0..100 {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {count} requests, got fewer within the deadline");
}

#[tokio::test]
async fn test_publish_delivers_signed_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let publisher = EventPublisher::new(
        vec![endpoint(format!("{}/hook", server.uri()), "hook-secret")],
        lazy_pool(),
        None,
    );

    let payload = serde_json::json!({ "room_id": "r-1", "status": 1 });
    publisher.publish("room.started", &payload);

    let requests = wait_for_requests(&server, 1).await;
    let request = &requests[0];

    // Headers
    let event_id = header(request, "X-Event-ID");
    assert!(!event_id.is_empty());
    assert_eq!(header(request, "X-Event-Type"), "room.started");
    assert_eq!(header(request, "Content-Type"), "application/json");
    assert!(header(request, "X-Timestamp").parse::<i64>().is_ok());

    // Signature covers the exact body bytes under the endpoint secret
    let signature = header(request, "X-Signature");
    assert!(common::signature::verify(
        b"hook-secret",
        &request.body,
        &signature
    ));

    // Query parameters mirror the headers
    let query: std::collections::HashMap<_, _> = request.url.query_pairs().collect();
    assert_eq!(
        query.get("event_type").map(AsRef::as_ref),
        Some("room.started")
    );
    assert_eq!(
        query.get("event_id").map(AsRef::as_ref),
        Some(event_id.as_str())
    );

    // Body is the payload itself, not an envelope
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, payload);
}

#[tokio::test]
async fn test_publish_fans_out_with_per_endpoint_secrets() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    for server in [&server_a, &server_b] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
    }

    let publisher = EventPublisher::new(
        vec![
            endpoint(format!("{}/a", server_a.uri()), "secret-a"),
            endpoint(format!("{}/b", server_b.uri()), "secret-b"),
        ],
        lazy_pool(),
        None,
    );

    publisher.publish("participant.joined", &serde_json::json!({ "uid": "alice" }));

    let request_a = &wait_for_requests(&server_a, 1).await[0];
    let request_b = &wait_for_requests(&server_b, 1).await[0];

    let sig_a = header(request_a, "X-Signature");
    let sig_b = header(request_b, "X-Signature");

    // Same body and event id, different secrets, different signatures
    assert_eq!(request_a.body, request_b.body);
    assert_eq!(
        header(request_a, "X-Event-ID"),
        header(request_b, "X-Event-ID")
    );
    assert_ne!(sig_a, sig_b);
    assert!(common::signature::verify(b"secret-a", &request_a.body, &sig_a));
    assert!(common::signature::verify(b"secret-b", &request_b.body, &sig_b));
}

#[tokio::test]
async fn test_publish_assigns_fresh_event_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let publisher = EventPublisher::new(vec![endpoint(server.uri(), "s")], lazy_pool(), None);

    publisher.publish("participant.left", &serde_json::json!({}));
    publisher.publish("participant.left", &serde_json::json!({}));

    let requests = wait_for_requests(&server, 2).await;
    assert_ne!(
        header(&requests[0], "X-Event-ID"),
        header(&requests[1], "X-Event-ID")
    );
}

#[tokio::test]
async fn test_room_finished_once_without_coordinator_still_publishes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let publisher = EventPublisher::new(vec![endpoint(server.uri(), "s")], lazy_pool(), None);

    // With no coordinator the once-guard degrades to "emit anyway".
    publisher
        .publish_room_finished_once("r-1", &serde_json::json!({ "room_id": "r-1" }))
        .await;

    let requests = wait_for_requests(&server, 1).await;
    assert_eq!(header(&requests[0], "X-Event-Type"), "room.finished");
}

#[tokio::test]
async fn test_publish_with_no_endpoints_sends_nothing() {
    let publisher = EventPublisher::new(Vec::new(), lazy_pool(), None);
    publisher.publish("room.started", &serde_json::json!({}));
    publisher
        .publish_room_finished_once("r-1", &serde_json::json!({}))
        .await;

    // No receivers to observe; this only checks neither path panics or
    // touches the (never-connected) pool.
    tokio::time::sleep(Duration::from_millis(50)).await;
}
