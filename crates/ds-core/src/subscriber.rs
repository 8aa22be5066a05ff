//! A single stream subscriber: a pending buffer plus the channel its
//! flushed chunks are written to (spec.md §4.E "Buffering semantics").

use std::sync::Arc;
use std::time::{Duration, Instant};

use ds_protocol::Event;
use tokio::sync::mpsc;

/// One unit of output delivered to a subscriber's long-poll handler.
pub enum SubscriberChunk {
    /// The subscriber's `last_seen_id` predated the ring; it must re-fetch.
    Gap,
    Events(Vec<Arc<Event>>),
}

pub struct Subscriber {
    pub id: u64,
    pub label: Option<String>,
    pending: Vec<Arc<Event>>,
    last_flush: Instant,
    buffering_time: Duration,
    sink: mpsc::UnboundedSender<SubscriberChunk>,
}

impl Subscriber {
    pub(crate) fn new(
        id: u64,
        label: Option<String>,
        buffering_time: Duration,
        sink: mpsc::UnboundedSender<SubscriberChunk>,
    ) -> Self {
        Self {
            id,
            label,
            pending: Vec::new(),
            last_flush: Instant::now(),
            buffering_time,
            sink,
        }
    }

    /// Queue one event for this subscriber. When `buffering_time` is zero,
    /// batching is disabled and the event is flushed immediately.
    pub(crate) fn enqueue(&mut self, event: Arc<Event>) {
        self.pending.push(event);
        if self.buffering_time.is_zero() {
            self.flush();
        }
    }

    pub(crate) fn send_gap(&self) {
        let _ = self.sink.send(SubscriberChunk::Gap);
    }

    pub(crate) fn due_for_flush(&self, now: Instant) -> bool {
        !self.pending.is_empty() && now.duration_since(self.last_flush) >= self.buffering_time
    }

    /// Bundle everything currently queued into one chunk and send it.
    /// No-op if nothing is pending.
    pub(crate) fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let _ = self.sink.send(SubscriberChunk::Events(batch));
        self.last_flush = Instant::now();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}
