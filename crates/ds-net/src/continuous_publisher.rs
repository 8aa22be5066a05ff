//! Continuous publisher: buffers outbound events and POSTs them as a
//! single request to a target stream (spec.md §4.H).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ds_protocol::{wire, Event};
use tokio::sync::Mutex;
use tracing::warn;

use crate::backoff::Backoff;

/// Implementation-defined bound recommended by spec.md §4.H: whichever of
/// these limits is hit first evicts the oldest queued event.
pub const DEFAULT_MAX_QUEUE_EVENTS: usize = 1024;
pub const DEFAULT_MAX_QUEUE_AGE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ContinuousPublisherConfig {
    /// Full URL of the target stream's publish endpoint.
    pub target_url: String,
    pub buffering_time: Duration,
    pub max_queue_events: usize,
    pub max_queue_age: Duration,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ContinuousPublisherConfig {
    fn default() -> Self {
        Self {
            target_url: String::new(),
            buffering_time: Duration::from_secs(1),
            max_queue_events: DEFAULT_MAX_QUEUE_EVENTS,
            max_queue_age: DEFAULT_MAX_QUEUE_AGE,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Buffers events through [`ContinuousPublisher::publish`] /
/// [`ContinuousPublisher::publish_events`] and flushes them as one POST
/// per `buffering_time` window, retrying on failure with backoff while
/// keeping at most one request in flight at a time.
pub struct ContinuousPublisher {
    http: reqwest::Client,
    config: ContinuousPublisherConfig,
    queue: Mutex<VecDeque<(Event, Instant)>>,
    in_flight: Mutex<()>,
    dropped: AtomicU64,
}

impl ContinuousPublisher {
    pub fn new(config: ContinuousPublisherConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            queue: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(()),
            dropped: AtomicU64::new(0),
        }
    }

    pub async fn publish(&self, event: Event) {
        self.publish_events(vec![event]).await;
    }

    pub async fn publish_events(&self, events: Vec<Event>) {
        let mut queue = self.queue.lock().await;
        let now = Instant::now();
        for event in events {
            if queue.len() >= self.config.max_queue_events {
                queue.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back((event, now));
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Spawn the background flush loop, ticking every `buffering_time`
    /// (or every 10ms if `buffering_time` is zero).
    pub fn spawn_flush_loop(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tick = self.config.buffering_time.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                self.flush_once().await;
            }
        })
    }

    /// Evict events older than `max_queue_age`, drain the rest into one
    /// batch, and send it. No-op if the queue is empty after eviction.
    pub async fn flush_once(&self) {
        let batch = {
            let mut queue = self.queue.lock().await;
            let now = Instant::now();
            while let Some((_, enqueued_at)) = queue.front() {
                if now.duration_since(*enqueued_at) > self.config.max_queue_age {
                    queue.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                } else {
                    break;
                }
            }
            if queue.is_empty() {
                return;
            }
            queue.drain(..).map(|(event, _)| event).collect::<Vec<_>>()
        };
        self.send_with_retry(batch).await;
    }

    async fn send_with_retry(&self, batch: Vec<Event>) {
        let _guard = self.in_flight.lock().await;
        let body = wire::encode_batch(&batch, wire::Syntax::Opaque);
        let mut backoff = Backoff::new(self.config.base_backoff, self.config.max_backoff);
        loop {
            match self
                .http
                .post(&self.config.target_url)
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    warn!(status = %resp.status(), target = %self.config.target_url, "continuous publisher target rejected batch");
                }
                Err(e) => {
                    warn!(error = %e, target = %self.config.target_url, "continuous publisher request failed");
                }
            }
            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event(id: &str) -> Event {
        Event {
            event_id: id.to_owned(),
            source_id: "driver-1".to_owned(),
            timestamp: "2026-07-27T10:00:00Z".to_owned(),
            application_id: "SmartDriver".to_owned(),
            event_type: "Location".to_owned(),
            aggregator_id: vec![],
            body: vec![],
            extra_headers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn publish_then_flush_posts_one_batch_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = ContinuousPublisher::new(ContinuousPublisherConfig {
            target_url: format!("{}/publish", server.uri()),
            ..Default::default()
        });
        publisher
            .publish_events(vec![sample_event("a"), sample_event("b")])
            .await;
        publisher.flush_once().await;
        assert_eq!(publisher.queue_len().await, 0);
    }

    #[tokio::test]
    async fn queue_evicts_oldest_past_max_events() {
        let publisher = ContinuousPublisher::new(ContinuousPublisherConfig {
            target_url: "http://example.invalid/publish".to_owned(),
            max_queue_events: 2,
            ..Default::default()
        });
        publisher
            .publish_events(vec![sample_event("a"), sample_event("b"), sample_event("c")])
            .await;
        assert_eq!(publisher.queue_len().await, 2);
        assert_eq!(publisher.dropped_count(), 1);
    }

    #[tokio::test]
    async fn flush_once_is_a_noop_on_empty_queue() {
        let publisher = ContinuousPublisher::new(ContinuousPublisherConfig::default());
        publisher.flush_once().await;
        assert_eq!(publisher.queue_len().await, 0);
    }
}
