//! Tests for the settings endpoint publisher against a mock server.

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use status_mpris::debounce::{Debouncer, StopReason};
use status_mpris::mpris::MetadataSource;
use status_mpris::presence::CustomStatus;
use status_mpris::publisher::{HttpPublisher, PublishError, Publisher};

const SETTINGS: &str = "/users/@me/settings";

fn status() -> CustomStatus {
    CustomStatus {
        text: "Listening to Radiohead - Weird Fishes".into(),
        expires_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap(),
        emoji_name: "🎵".into(),
    }
}

#[tokio::test]
async fn clearing_sends_explicit_null() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(SETTINGS))
        .and(header("authorization", "secret"))
        .and(body_json(json!({ "custom_status": null })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let publisher = HttpPublisher::new(&server.uri(), "secret", None).unwrap();
    publisher.publish(None).await.unwrap();
}

#[tokio::test]
async fn active_status_is_sent_with_expiry() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(SETTINGS))
        .and(body_partial_json(json!({
            "custom_status": {
                "text": "Listening to Radiohead - Weird Fishes",
                "emoji_name": "🎵",
            }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let publisher =
        HttpPublisher::new(&server.uri(), "secret", Some(Duration::from_secs(5))).unwrap();
    publisher.publish(Some(&status())).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    let expires = body["custom_status"]["expires_at"].as_str().unwrap();
    assert_eq!(expires.parse::<chrono::DateTime<Utc>>().unwrap(), status().expires_at);
}

#[tokio::test]
async fn rejected_update_reports_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(SETTINGS))
        .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
        .mount(&server)
        .await;

    let publisher = HttpPublisher::new(&server.uri(), "bad", None).unwrap();
    let result = publisher.publish(None).await;

    assert_matches!(
        result,
        Err(PublishError::Status { status: 401, ref message }) if message.contains("Unauthorized")
    );
}

#[tokio::test]
async fn slow_server_hits_the_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let publisher =
        HttpPublisher::new(&server.uri(), "secret", Some(Duration::from_millis(100))).unwrap();
    let result = publisher.publish(None).await;

    assert_matches!(result, Err(PublishError::Request(ref e)) if e.is_timeout());
}

#[tokio::test]
async fn loop_publishes_over_http_until_interrupted() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path(SETTINGS))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (line_tx, line_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let source = MetadataSource::from_task(line_rx, tokio::spawn(std::future::pending::<()>()));
    let publisher =
        HttpPublisher::new(&server.uri(), "secret", Some(Duration::from_secs(5))).unwrap();
    let handle = tokio::spawn(
        Debouncer::new(publisher, Duration::from_secs(600), "🎵").run(source, async move {
            let _ = stop_rx.await;
        }),
    );

    line_tx.send("Playing: Radiohead - Weird Fishes".into()).await.unwrap();
    line_tx.send("Paused: Radiohead - Weird Fishes".into()).await.unwrap();

    let mut bodies = Vec::new();
    for _ in 0..250 {
        let requests = server.received_requests().await.unwrap();
        if requests.len() >= 2 {
            bodies = requests
                .iter()
                .map(|r| r.body_json::<serde_json::Value>().unwrap())
                .collect();
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(bodies.len(), 2, "expected two status updates");
    assert_eq!(bodies[0]["custom_status"]["text"], "Listening to Radiohead - Weird Fishes");
    assert_eq!(bodies[1], json!({ "custom_status": null }));

    stop_tx.send(()).unwrap();
    assert_eq!(handle.await.unwrap(), StopReason::Interrupted);
}
