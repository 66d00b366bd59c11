//! HTTP-level tests of the Kismet client

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wids_pipeline::config::KismetConfig;
use wids_pipeline::error::DependencyError;
use wids_pipeline::logic::kismet::{KismetClient, TelemetrySource};
use wids_pipeline::logic::retry::RetryPolicy;

fn client(server: &MockServer, api_key: Option<&str>) -> KismetClient {
    let config = KismetConfig {
        url: format!("{}/", server.uri()),
        api_key: api_key.map(str::to_string),
        username: None,
        password: None,
        timeout_secs: 5,
    };
    KismetClient::new(&config, RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))).unwrap()
}

#[tokio::test]
async fn test_fetch_since_posts_field_selection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/devices/last-time/1700000000/devices.json"))
        .and(header("cookie", "KISMET=abc123"))
        .and(body_string_contains("json="))
        .and(body_string_contains("macaddr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "macaddr": "AA:BB:CC:DD:EE:01", "last_time": 1_700_000_010 },
            { "macaddr": "AA:BB:CC:DD:EE:02", "last_time": 1_700_000_020 }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let records = client(&server, Some("abc123")).fetch_since(1_700_000_000).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].last_time(), Some(1_700_000_020));
}

#[tokio::test]
async fn test_non_array_body_is_invalid() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "nope" })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, None).fetch_since(0).await.unwrap_err();
    assert!(matches!(err, DependencyError::InvalidResponse { .. }));
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("login required"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, None).fetch_since(0).await.unwrap_err();
    assert!(matches!(err, DependencyError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn test_unavailable_is_retried_then_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, None).fetch_since(0).await.unwrap_err();
    assert!(err.is_transient());
}
