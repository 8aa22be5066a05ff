use std::collections::HashMap;

use backend::cli::Args;
use ds_protocol::{wire, Event};

fn args(dir: &std::path::Path) -> Args {
    Args {
        port: 0,
        buffer: 0,
        log_level: "error".to_owned(),
        disable_stderr: true,
        disable_persistence: false,
        persistence_dir: dir.to_string_lossy().into_owned(),
    }
}

fn event(id: &str) -> Event {
    Event {
        event_id: id.to_owned(),
        source_id: "collector-1".to_owned(),
        timestamp: "2026-07-27T10:00:00Z".to_owned(),
        application_id: "SmartDriver".to_owned(),
        event_type: "Vehicle Location".to_owned(),
        aggregator_id: vec![],
        body: vec![],
        extra_headers: HashMap::new(),
    }
}

async fn spawn(args: &Args) -> String {
    let (_node, router) = backend::build(args).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn published_batch_is_readable_by_a_subsequent_subscriber() {
    let dir = tempfile::tempdir().unwrap();
    let base = spawn(&args(dir.path())).await;
    let client = reqwest::Client::new();

    let frame = wire::encode_batch(&[event("a"), event("b")], wire::Syntax::Opaque);
    let resp = client.post(&base).body(frame).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/stream"))
        .send()
        .await
        .unwrap();
    let body = resp.bytes().await.unwrap();
    let (events, _) = wire::decode_all(&body).unwrap();
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn journal_persists_events_across_node_restarts() {
    let dir = tempfile::tempdir().unwrap();
    {
        let base = spawn(&args(dir.path())).await;
        let client = reqwest::Client::new();
        let frame = wire::encode_batch(&[event("a")], wire::Syntax::Opaque);
        client.post(&base).body(frame).send().await.unwrap();
        // Give the async publish/journal-append a moment to land before
        // the next node opens the same file.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    let journal_path = dir.path().join("backend.journal");
    let journal = ds_core::EventJournal::open(&journal_path).unwrap();
    let replayed = journal.replay().unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].event_id, "a");
}
