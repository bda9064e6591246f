#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ember_api::{CommandBody, DeviceClient, Error, PinHash, derive_session_secret};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = DeviceClient::with_client(reqwest::Client::new(), base_url, 5);
    (server, client)
}

fn status_body() -> serde_json::Value {
    json!({
        "meta": {
            "nonce": "EB6A13C8F2",
            "hw_version": "5",
            "sw_version": "1.42",
            "eco_editable": true
        },
        "prg": true,
        "sp_temp": 21.5,
        "is_temp": 20.8,
        "eco_mode": false,
        "wprg": [[1, 2], [3, 4]]
    })
}

// ── Status polling ──────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.cgi"))
        .and(header("cache-control", "no-cache"))
        .and(header("pragma", "no-cache"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
        .expect(1)
        .mount(&server)
        .await;

    let doc = client.poll_status().await.unwrap();

    assert_eq!(doc.nonce().as_deref(), Some("EB6A13C8F2"));
    assert_eq!(doc.hw_version().as_deref(), Some("5"));
    assert_eq!(doc.sw_version().as_deref(), Some("1.42"));
    assert_eq!(doc.eco_editable(), Some(true));
    assert_eq!(doc.fields().get("sp_temp"), Some(&json!(21.5)));
}

#[tokio::test]
async fn test_poll_status_busts_cache() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.cgi"))
        .and(query_param_is_missing("_"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/status.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
        .mount(&server)
        .await;

    // Only succeeds when the timestamp parameter is present.
    client.poll_status().await.unwrap();
}

#[tokio::test]
async fn test_poll_status_non_200() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.cgi"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let result = client.poll_status().await;

    assert!(
        matches!(result, Err(Error::UnexpectedStatus { status: 503, .. })),
        "expected UnexpectedStatus, got: {result:?}"
    );
    assert!(result.unwrap_err().is_transient());
}

#[tokio::test]
async fn test_poll_status_bad_json() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/status.cgi"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client.poll_status().await;
    assert!(matches!(result, Err(Error::Deserialization { .. })));
}

#[tokio::test]
async fn test_poll_status_connection_refused() {
    // Nothing listens on port 9 on loopback.
    let client = DeviceClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
        5,
    );

    let err = client.poll_status().await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_headers_and_body() {
    let (server, client) = setup().await;

    let pin_hash = PinHash::from_pin(&SecretString::from("1234".to_owned()));
    let secret = derive_session_secret("EB6A13C8F2", &pin_hash);
    let expected_pin = ember_api::derive_hash(&format!("EB6A13C8F2{}", pin_hash.as_str()));

    Mock::given(method("POST"))
        .and(path("/status.cgi"))
        .and(header("x-hs-pin", expected_pin.as_str()))
        .and(header("token", "32bytes"))
        .and(header("x-backend-ip", "https://app.haassohn.com"))
        .and(header("content-type", "application/json"))
        .and(header_exists("content-length"))
        .and(body_json(json!({ "sp_temp": 22.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body()))
        .expect(1)
        .mount(&server)
        .await;

    client
        .send_command(&CommandBody::TargetTemperature(22.0), &secret)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_command_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/status.cgi"))
        .respond_with(ResponseTemplate::new(403).set_body_string("wrong pin"))
        .mount(&server)
        .await;

    let secret = SecretString::from("stale".to_owned());
    let err = client
        .send_command(&CommandBody::Program(true), &secret)
        .await
        .unwrap_err();

    assert!(err.is_auth_rejected(), "expected auth rejection, got: {err:?}");
}
