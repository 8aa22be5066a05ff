//! axum HTTP surface for a [`StreamNode`]: publish + subscribe routes
//! (spec.md §6), mounted by each stream-node binary (`collector`,
//! `backend`, `dbfeed`) at its configured base path.
//!
//! The long-poll `/stream` handler holds the response open until the
//! subscriber's next buffered flush (or a gap marker) arrives, or an idle
//! timeout elapses with an empty body — the client reissues the long-poll
//! immediately after reading a chunk (spec.md §9's "BroadcastStream-over-
//! SSE" design note, adapted to the plain chunked wire framing instead of
//! `text/event-stream`).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use ds_protocol::{wire, Event, HttpErrorEnvelope, SubscribeQuery};
use tracing::warn;

use crate::stream_node::{StreamNode, StreamNodeError, SubscribeOptions};
use crate::subscriber::SubscriberChunk;

const GAP_HEADER: &str = "X-Gap";

/// How long a long-poll request holds the connection open before
/// returning an empty 200 for the client to immediately reissue.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(25);

/// Runs after a publish call succeeds, with the chance to produce a
/// synchronous response (the feedback JSON, spec.md §4.I) instead of the
/// default empty 200. Only `collector` installs one; `backend` and
/// `dbfeed` publish with `hook: None`.
pub trait PublishHook: Send + Sync {
    fn after_publish<'a>(
        &'a self,
        events: &'a [Event],
    ) -> Pin<Box<dyn Future<Output = Option<Response>> + Send + 'a>>;
}

#[derive(Clone)]
struct PublishState {
    node: Arc<StreamNode>,
    hook: Option<Arc<dyn PublishHook>>,
}

#[derive(Clone)]
struct SubscribeState {
    node: Arc<StreamNode>,
    idle_timeout: Duration,
}

/// `POST /` (+ `GET` alias for embedded clients, spec.md §6).
pub fn publish_router(node: Arc<StreamNode>, hook: Option<Arc<dyn PublishHook>>) -> Router {
    Router::new()
        .route("/", post(publish).get(publish))
        .with_state(PublishState { node, hook })
}

/// `GET /stream` and `GET /compressed`.
pub fn subscribe_router(node: Arc<StreamNode>) -> Router {
    subscribe_router_with_idle_timeout(node, DEFAULT_IDLE_TIMEOUT)
}

pub fn subscribe_router_with_idle_timeout(node: Arc<StreamNode>, idle_timeout: Duration) -> Router {
    Router::new()
        .route("/stream", get(subscribe))
        .route("/compressed", get(subscribe_compressed))
        .with_state(SubscribeState { node, idle_timeout })
}

async fn publish(State(state): State<PublishState>, body: Bytes) -> Response {
    if !state.node.config().allow_publish {
        return (
            StatusCode::FORBIDDEN,
            Json(HttpErrorEnvelope::new(
                "publish_not_allowed",
                "this stream is read-only",
            )),
        )
            .into_response();
    }
    if body.is_empty() {
        return ok_empty();
    }
    let (events, _consumed) = match wire::decode_all(&body) {
        Ok(pair) => pair,
        Err(e) => return bad_request(&e.to_string()),
    };
    if events.is_empty() {
        return bad_request("request body did not contain a complete event frame");
    }

    if let Err(e) = state.node.publish(events.clone()).await {
        return match e {
            StreamNodeError::Stopped => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HttpErrorEnvelope::new("stopped", "stream is stopped")),
            )
                .into_response(),
            other => {
                warn!(error = %other, "publish failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(HttpErrorEnvelope::new("internal", other.to_string())),
                )
                    .into_response()
            }
        };
    }

    if let Some(hook) = &state.hook {
        if let Some(response) = hook.after_publish(&events).await {
            return response;
        }
    }
    ok_empty()
}

fn ok_empty() -> Response {
    StatusCode::OK.into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(HttpErrorEnvelope::new("parse_error", message)),
    )
        .into_response()
}

async fn subscribe(
    State(state): State<SubscribeState>,
    Query(query): Query<SubscribeQuery>,
) -> Response {
    run_subscribe(state.node, query, state.idle_timeout).await
}

async fn subscribe_compressed(
    State(state): State<SubscribeState>,
    Query(mut query): Query<SubscribeQuery>,
) -> Response {
    query.deflate = true;
    run_subscribe(state.node, query, state.idle_timeout).await
}

async fn run_subscribe(node: Arc<StreamNode>, query: SubscribeQuery, idle_timeout: Duration) -> Response {
    let (sub_id, mut rx) = node
        .subscribe(SubscribeOptions {
            last_seen_id: query.last_seen_id,
            label: query.label,
        })
        .await;

    let chunk = tokio::time::timeout(idle_timeout, rx.recv()).await;
    node.unsubscribe(sub_id).await;

    match chunk {
        Ok(Some(SubscriberChunk::Gap)) => gap_response(),
        Ok(Some(SubscriberChunk::Events(events))) => events_response(&events, query.deflate),
        Ok(None) | Err(_) => ok_empty(),
    }
}

fn gap_response() -> Response {
    let mut resp = ok_empty();
    resp.headers_mut()
        .insert(GAP_HEADER, HeaderValue::from_static("true"));
    resp
}

fn events_response(events: &[Arc<Event>], deflate: bool) -> Response {
    let owned: Vec<Event> = events.iter().map(|e| (**e).clone()).collect();
    let body = wire::encode_batch(&owned, wire::Syntax::Opaque);
    if !deflate {
        return body.into_response();
    }
    let compressed = deflate_compress(&body);
    let mut resp = compressed.into_response();
    resp.headers_mut()
        .insert(header::CONTENT_ENCODING, HeaderValue::from_static("deflate"));
    resp
}

fn deflate_compress(bytes: &[u8]) -> Vec<u8> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(bytes);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_node::{ParsePolicy, StreamNodeConfig};
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    fn event(id: &str) -> Event {
        Event {
            event_id: id.to_owned(),
            source_id: "driver-1".to_owned(),
            timestamp: "2026-07-27T10:00:00Z".to_owned(),
            application_id: "SmartDriver".to_owned(),
            event_type: "Vehicle Location".to_owned(),
            aggregator_id: vec![],
            body: vec![],
            extra_headers: HashMap::new(),
        }
    }

    async fn spawn_test_server(node: Arc<StreamNode>) -> String {
        let router = Router::new().nest(
            "/collector",
            publish_router(Arc::clone(&node), None)
                .merge(subscribe_router_with_idle_timeout(node, StdDuration::from_millis(200))),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/collector")
    }

    #[tokio::test]
    async fn publish_then_subscribe_round_trips_over_http() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig {
            parse_policy: ParsePolicy::Opaque,
            ..Default::default()
        }));
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let frame = wire::encode_batch(&[event("a")], wire::Syntax::Opaque);
        let resp = client.post(&base).body(frame).send().await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client
            .get(format!("{base}/stream"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.bytes().await.unwrap();
        let (events, _) = wire::decode_all(&body).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, "a");
    }

    #[tokio::test]
    async fn subscribe_with_unknown_last_seen_id_reports_a_gap() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{base}/stream?last_seen_id=never-seen"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get(GAP_HEADER).unwrap(), "true");
    }

    #[tokio::test]
    async fn subscribe_times_out_to_an_empty_200_when_nothing_is_published() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let resp = client.get(format!("{base}/stream")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_with_malformed_body_is_rejected() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(&base)
            .body("not an event frame")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn publish_after_stop_returns_503() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        node.stop().await;
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let frame = wire::encode_batch(&[event("a")], wire::Syntax::Opaque);
        let resp = client.post(&base).body(frame).send().await.unwrap();
        assert_eq!(resp.status(), 503);
    }

    #[tokio::test]
    async fn subscribe_compressed_returns_deflated_body() {
        let node = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        node.publish(vec![event("a")]).await.unwrap();
        let base = spawn_test_server(node).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{base}/compressed"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get(header::CONTENT_ENCODING).unwrap(), "deflate");
        let body = resp.bytes().await.unwrap();
        let mut decoder = flate2::read::DeflateDecoder::new(&body[..]);
        let mut decoded = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decoded).unwrap();
        let (events, _) = wire::decode_all(&decoded).unwrap();
        assert_eq!(events.len(), 1);
    }
}
