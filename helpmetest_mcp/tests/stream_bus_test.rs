//! End-to-end: a mocked streaming endpoint feeding the event bus.

use helpmetest_mcp::config::BusSettings;
use helpmetest_mcp::event_bus::{
    EventBus, EventKind, HttpStreamLauncher, ListenOutcome, StreamLauncher,
};
use helpmetest_mcp::notifier::OutboundNotifier;
use helpmetest_mcp::test_utils::RecordingTransport;
use helpmetest_stream_client::client::StreamConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_streamed_records_are_delivered_by_listen() {
    let server = MockServer::start().await;
    let body = [
        json!({"_type_": "PING", "room": "chat.acme", "id": "p1"}),
        json!({"sender": "user", "status": "processing", "text": "run smoke tests",
               "messageId": "m1", "room": "chat.acme"}),
        json!({"type": "test_status_change", "testId": "t1", "testName": "Smoke",
               "previousStatus": "passed", "status": "failed"}),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n\n")
        + "\n\n";
    Mock::given(method("POST"))
        .and(path("/api/stream/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let config = StreamConfig::new(Url::parse(&server.uri()).unwrap(), "acme", "tok")
        .with_backoff(Duration::from_secs(60), Duration::from_secs(60));
    let launcher: Arc<dyn StreamLauncher> = Arc::new(HttpStreamLauncher::new(config));
    let transport = Arc::new(RecordingTransport::new());
    let notifier = Arc::new(OutboundNotifier::new(transport.clone()));
    let bus = EventBus::new("acme", BusSettings::default(), notifier, Some(launcher));

    let mut kinds = Vec::new();
    for _ in 0..10 {
        if let ListenOutcome::Events { events, .. } =
            bus.listen_to_events(Duration::from_secs(2)).await
        {
            kinds.extend(events.iter().map(|r| r.kind()));
        }
        if kinds.len() >= 2 {
            break;
        }
    }
    assert_eq!(kinds, vec![EventKind::UserMessage, EventKind::TestStatusChange]);

    assert!(
        transport
            .wait_until(Duration::from_secs(5), |posts| {
                posts
                    .iter()
                    .any(|p| p.message.get("_type_") == Some(&json!("Pong")))
                    && posts.iter().any(|p| p.key == "m1")
            })
            .await
    );
    bus.shutdown();
}
