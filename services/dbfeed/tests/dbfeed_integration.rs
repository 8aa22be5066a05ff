use std::collections::HashMap;

use dbfeed::cli::Args;
use ds_protocol::{wire, Event};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn args(backend_stream: &str, dir: &std::path::Path) -> Args {
    Args {
        port: 0,
        log_level: "error".to_owned(),
        disable_stderr: true,
        disable_persistence: false,
        persistence_dir: dir.to_string_lossy().into_owned(),
        backend_stream: backend_stream.to_owned(),
    }
}

fn event(app: &str, event_type: &str, id: &str) -> Event {
    Event {
        event_id: id.to_owned(),
        source_id: "driver-1".to_owned(),
        timestamp: "2026-07-27T10:00:00Z".to_owned(),
        application_id: app.to_owned(),
        event_type: event_type.to_owned(),
        aggregator_id: vec![],
        body: vec![],
        extra_headers: HashMap::new(),
    }
}

#[tokio::test]
async fn filters_to_the_driver_application_and_persists_matching_events() {
    let upstream = MockServer::start().await;
    let frame = wire::encode_batch(
        &[
            event("SmartDriver", "Vehicle Location", "a"),
            event("OtherApp", "Heartbeat", "b"),
        ],
        wire::Syntax::Opaque,
    );
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(frame))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&upstream)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cfg = args(&format!("{}/stream", upstream.uri()), dir.path());
    let (node, router, _shutdown) = dbfeed::build(&cfg).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give the relay client's first poll time to land.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(node.ring_len().await, 1);

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/stream?last_seen_id=none"))
        .send()
        .await
        .unwrap();
    let body = resp.bytes().await.unwrap();
    let (events, _) = wire::decode_all(&body).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, "a");
}
