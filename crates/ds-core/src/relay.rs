//! In-process local subscriber: taps a parent stream and republishes
//! matching events to a read-only per-type sub-stream (spec.md §4.F).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::stream_node::{ParsePolicy, StreamNode, StreamNodeConfig, SubscribeOptions};
use crate::subscriber::SubscriberChunk;

/// A filter naming which `(application_id, event_type)` pairs a relay
/// republishes. An empty `event_types` set matches every type for that
/// application.
#[derive(Debug, Clone)]
pub struct RelayFilter {
    pub application_id: String,
    pub event_types: HashSet<String>,
}

impl RelayFilter {
    pub fn matches(&self, application_id: &str, event_type: &str) -> bool {
        application_id == self.application_id
            && (self.event_types.is_empty() || self.event_types.contains(event_type))
    }
}

/// Taps `parent` and republishes every event matching `filter` onto a
/// fresh child [`StreamNode`] mounted, by convention, at
/// `<parent>/type/<event_type_no_spaces>`. The child is read-only
/// (`allow_publish=false`); callers mount its subscribe routes only.
pub struct EventTypeRelay {
    pub child: Arc<StreamNode>,
    filter: RelayFilter,
}

impl EventTypeRelay {
    /// Register the tap and return the relay plus a handle to its
    /// background forwarding task. Dropping the handle does not stop the
    /// task; call [`StreamNode::stop`] on `parent` or abort the handle.
    pub async fn spawn(parent: Arc<StreamNode>, filter: RelayFilter) -> (Self, tokio::task::JoinHandle<()>) {
        let child = Arc::new(StreamNode::new(StreamNodeConfig {
            buffering_time: parent.config().buffering_time,
            ring_capacity: parent.config().ring_capacity,
            parse_policy: ParsePolicy::Opaque,
            allow_publish: false,
        }));
        Self::spawn_into(parent, child, filter).await
    }

    /// Like [`EventTypeRelay::spawn`], but republishes into a
    /// caller-supplied `child` instead of a freshly created one — used by
    /// `dbfeed` to filter onto a journal-backed node (spec.md §0's
    /// "applies a configurable event-type filter ... persists to disk").
    pub async fn spawn_into(
        parent: Arc<StreamNode>,
        child: Arc<StreamNode>,
        filter: RelayFilter,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (sub_id, mut rx) = parent.subscribe(SubscribeOptions::default()).await;
        let task_child = Arc::clone(&child);
        let task_parent = Arc::clone(&parent);
        let task_filter = filter.clone();
        let handle = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                let SubscriberChunk::Events(events) = chunk else {
                    warn!("event type relay received a gap marker from its parent tap; ignoring");
                    continue;
                };
                let matching: Vec<_> = events
                    .into_iter()
                    .filter(|e| task_filter.matches(&e.application_id, &e.event_type))
                    .map(|e| (*e).clone())
                    .collect();
                if matching.is_empty() {
                    continue;
                }
                if task_child.publish(matching).await.is_err() {
                    break;
                }
            }
            task_parent.unsubscribe(sub_id).await;
        });

        (Self { child, filter }, handle)
    }

    pub fn filter(&self) -> &RelayFilter {
        &self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_protocol::Event;
    use std::collections::HashMap;
    use std::time::Duration;

    fn event(app: &str, event_type: &str) -> Event {
        Event {
            event_id: ds_protocol::Event::new_event_id(),
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
    async fn relay_forwards_only_matching_events() {
        let parent = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        let filter = RelayFilter {
            application_id: "SmartDriver".to_owned(),
            event_types: ["Vehicle Location".to_owned()].into_iter().collect(),
        };
        let (relay, _handle) = EventTypeRelay::spawn(Arc::clone(&parent), filter).await;

        parent
            .publish(vec![
                event("SmartDriver", "Vehicle Location"),
                event("SmartDriver", "Other"),
                event("OtherApp", "Vehicle Location"),
            ])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(relay.child.ring_len().await, 1);
    }

    #[tokio::test]
    async fn relay_child_is_read_only() {
        let parent = Arc::new(StreamNode::new(StreamNodeConfig::default()));
        let filter = RelayFilter {
            application_id: "SmartDriver".to_owned(),
            event_types: HashSet::new(),
        };
        let (relay, _handle) = EventTypeRelay::spawn(parent, filter).await;
        assert!(!relay.child.config().allow_publish);
    }
}
