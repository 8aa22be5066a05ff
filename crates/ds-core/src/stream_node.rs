//! The stream node engine: publish/subscribe, buffered dispatch, and the
//! recent-events ring, per spec.md §4.E.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ds_protocol::Event;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::journal::{EventJournal, JournalError};
use crate::ring::{RecentEventsRing, SeekResult, DEFAULT_RING_CAPACITY};
use crate::subscriber::{Subscriber, SubscriberChunk};

/// A stream's body interpretation (spec.md §4.E "Parse policy").
/// `SemanticRdf` is tracked at the protocol layer but never reached here;
/// the annotation service that would consume it is external (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePolicy {
    Opaque,
    Json,
}

#[derive(Debug, Clone)]
pub struct StreamNodeConfig {
    pub buffering_time: Duration,
    pub ring_capacity: usize,
    pub parse_policy: ParsePolicy,
    pub allow_publish: bool,
}

impl Default for StreamNodeConfig {
    fn default() -> Self {
        Self {
            buffering_time: Duration::from_millis(0),
            ring_capacity: DEFAULT_RING_CAPACITY,
            parse_policy: ParsePolicy::Opaque,
            allow_publish: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum StreamNodeError {
    #[error("stream node is stopped")]
    Stopped,
    /// Raised by the HTTP layer before calling [`StreamNode::publish`] when
    /// `config.allow_publish` is false (read-only sub-streams); the engine
    /// itself has no opinion on which of its callers may publish.
    #[error("publish is not permitted on this stream")]
    PublishNotAllowed,
    #[error("persistence error: {0}")]
    Journal(#[from] JournalError),
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub last_seen_id: Option<String>,
    pub label: Option<String>,
}

struct Inner {
    ring: RecentEventsRing,
    subscribers: HashMap<u64, Subscriber>,
    next_subscriber_id: u64,
    stopped: bool,
    journal: Option<EventJournal>,
}

/// An append-only publish/subscribe endpoint identified by the URL path it
/// is mounted at. One instance backs `collector`, `backend`, and each
/// per-type sub-stream an [`crate::relay::EventTypeRelay`] creates.
pub struct StreamNode {
    config: StreamNodeConfig,
    inner: RwLock<Inner>,
}

impl StreamNode {
    pub fn new(config: StreamNodeConfig) -> Self {
        let ring = RecentEventsRing::new(config.ring_capacity);
        Self {
            config,
            inner: RwLock::new(Inner {
                ring,
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
                stopped: false,
                journal: None,
            }),
        }
    }

    /// Build a node whose ring is pre-populated from a journal's on-disk
    /// contents, and which appends every future publish back to it.
    pub fn with_journal(
        config: StreamNodeConfig,
        journal: EventJournal,
    ) -> Result<Self, StreamNodeError> {
        let mut ring = RecentEventsRing::new(config.ring_capacity);
        for event in journal.replay()? {
            ring.push(Arc::new(event));
        }
        Ok(Self {
            config,
            inner: RwLock::new(Inner {
                ring,
                subscribers: HashMap::new(),
                next_subscriber_id: 0,
                stopped: false,
                journal: Some(journal),
            }),
        })
    }

    pub fn config(&self) -> &StreamNodeConfig {
        &self.config
    }

    /// Append `events` to the ring, enqueue them to every subscriber, and
    /// persist them if the node opted into a journal.
    pub async fn publish(&self, events: Vec<Event>) -> Result<(), StreamNodeError> {
        let mut inner = self.inner.write().await;
        if inner.stopped {
            return Err(StreamNodeError::Stopped);
        }
        for event in events {
            if let Some(journal) = inner.journal.as_mut() {
                journal.append(&event)?;
            }
            let event = Arc::new(event);
            inner.ring.push(Arc::clone(&event));
            for sub in inner.subscribers.values_mut() {
                sub.enqueue(Arc::clone(&event));
            }
        }
        Ok(())
    }

    /// Register a subscriber, seeking `options.last_seen_id` into the ring
    /// first. Returns the receiver its flushed chunks (and a possible
    /// leading gap marker) arrive on, plus the subscriber id for later
    /// unsubscribe.
    pub async fn subscribe(
        &self,
        options: SubscribeOptions,
    ) -> (u64, mpsc::UnboundedReceiver<SubscriberChunk>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.write().await;
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        let seek = inner.ring.seek(options.last_seen_id.as_deref());
        let mut sub = Subscriber::new(id, options.label.clone(), self.config.buffering_time, tx);
        match seek {
            SeekResult::FromNow => {}
            SeekResult::Suffix(events) => {
                for event in events {
                    sub.enqueue(event);
                }
                sub.flush();
            }
            SeekResult::Gap => {
                warn!(subscriber = id, label = ?options.label, "last_seen_id predates ring, sending gap marker");
                sub.send_gap();
            }
        }
        inner.subscribers.insert(id, sub);
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.inner.write().await.subscribers.remove(&id);
    }

    /// Flush every subscriber whose `buffering_time` window has elapsed.
    pub async fn dispatch_buffered(&self) {
        let mut inner = self.inner.write().await;
        inner.subscribers.retain(|_, sub| !sub.is_closed());
        let now = Instant::now();
        for sub in inner.subscribers.values_mut() {
            if sub.due_for_flush(now) {
                sub.flush();
            }
        }
    }

    /// Drain every subscriber's buffer and mark the node stopped. Further
    /// `publish` calls return [`StreamNodeError::Stopped`].
    pub async fn stop(&self) {
        let mut inner = self.inner.write().await;
        for sub in inner.subscribers.values_mut() {
            sub.flush();
        }
        inner.stopped = true;
        debug!("stream node stopped");
    }

    pub async fn is_stopped(&self) -> bool {
        self.inner.read().await.stopped
    }

    pub async fn ring_len(&self) -> usize {
        self.inner.read().await.ring.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// Spawn the background task that periodically calls
    /// [`StreamNode::dispatch_buffered`]. A `buffering_time` of zero still
    /// runs this on a short tick as a backstop; subscribers with zero
    /// buffering flush immediately on enqueue regardless.
    pub fn spawn_dispatch_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let node = Arc::clone(self);
        let tick = node.config.buffering_time.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if node.is_stopped().await {
                    break;
                }
                node.dispatch_buffered().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn event(id: &str) -> Event {
        Event {
            event_id: id.to_owned(),
            source_id: "driver-1".to_owned(),
            timestamp: "2026-07-27T10:00:00Z".to_owned(),
            application_id: "SmartDriver".to_owned(),
            event_type: "Location".to_owned(),
            aggregator_id: vec![],
            body: vec![],
            extra_headers: Map::new(),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_published_after_subscribe() {
        let node = StreamNode::new(StreamNodeConfig::default());
        let (_, mut rx) = node.subscribe(SubscribeOptions::default()).await;
        node.publish(vec![event("a")]).await.unwrap();

        match rx.recv().await.unwrap() {
            SubscriberChunk::Events(events) => assert_eq!(events[0].event_id, "a"),
            SubscriberChunk::Gap => panic!("expected events"),
        }
    }

    #[tokio::test]
    async fn publish_after_stop_is_rejected() {
        let node = StreamNode::new(StreamNodeConfig::default());
        node.stop().await;
        let err = node.publish(vec![event("a")]).await.unwrap_err();
        assert!(matches!(err, StreamNodeError::Stopped));
    }

    #[tokio::test]
    async fn subscribe_with_stale_last_seen_id_gets_a_gap() {
        let node = StreamNode::new(StreamNodeConfig {
            ring_capacity: 1,
            ..Default::default()
        });
        node.publish(vec![event("a"), event("b")]).await.unwrap();

        let (_, mut rx) = node
            .subscribe(SubscribeOptions {
                last_seen_id: Some("a".to_owned()),
                label: None,
            })
            .await;
        match rx.recv().await.unwrap() {
            SubscriberChunk::Gap => {}
            SubscriberChunk::Events(_) => panic!("expected a gap"),
        }
    }

    #[tokio::test]
    async fn subscribe_with_known_last_seen_id_replays_suffix_immediately() {
        let node = StreamNode::new(StreamNodeConfig::default());
        node.publish(vec![event("a"), event("b"), event("c")])
            .await
            .unwrap();

        let (_, mut rx) = node
            .subscribe(SubscribeOptions {
                last_seen_id: Some("a".to_owned()),
                label: None,
            })
            .await;
        match rx.recv().await.unwrap() {
            SubscriberChunk::Events(events) => {
                let ids: Vec<&str> = events.iter().map(|e| e.event_id.as_str()).collect();
                assert_eq!(ids, vec!["b", "c"]);
            }
            SubscriberChunk::Gap => panic!("expected events"),
        }
    }

    #[tokio::test]
    async fn zero_buffering_time_flushes_immediately_without_dispatch_tick() {
        let node = StreamNode::new(StreamNodeConfig::default());
        let (_, mut rx) = node.subscribe(SubscribeOptions::default()).await;
        node.publish(vec![event("a")]).await.unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn nonzero_buffering_time_holds_until_dispatch() {
        let node = StreamNode::new(StreamNodeConfig {
            buffering_time: Duration::from_secs(60),
            ..Default::default()
        });
        let (_, mut rx) = node.subscribe(SubscribeOptions::default()).await;
        node.publish(vec![event("a")]).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscriber() {
        let node = StreamNode::new(StreamNodeConfig::default());
        let (id, _rx) = node.subscribe(SubscribeOptions::default()).await;
        assert_eq!(node.subscriber_count().await, 1);
        node.unsubscribe(id).await;
        assert_eq!(node.subscriber_count().await, 0);
    }
}
