//! Bounded recent-events ring: the sole source of truth for gap recovery
//! (spec.md §4.E "subscribe", §8 property 3).

use std::collections::VecDeque;
use std::sync::Arc;

use ds_protocol::Event;

/// Default ring capacity when a stream node isn't configured otherwise.
pub const DEFAULT_RING_CAPACITY: usize = 65_536;

/// Outcome of seeking a subscriber's `last_seen_id` into the ring.
pub enum SeekResult {
    /// No `last_seen_id` was given: the subscriber starts from "now" and
    /// sees nothing already on the ring.
    FromNow,
    /// `last_seen_id` was found; these are the events published after it.
    Suffix(Vec<Arc<Event>>),
    /// `last_seen_id` predates the ring (evicted, or never existed here).
    Gap,
}

pub struct RecentEventsRing {
    buf: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl RecentEventsRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, event: Arc<Event>) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.buf.iter()
    }

    /// Seek `last_seen_id` into the ring and return everything published
    /// after it, or a gap marker if it cannot be found.
    pub fn seek(&self, last_seen_id: Option<&str>) -> SeekResult {
        let Some(id) = last_seen_id else {
            return SeekResult::FromNow;
        };
        match self.buf.iter().position(|e| e.event_id == id) {
            Some(pos) => SeekResult::Suffix(self.buf.iter().skip(pos + 1).cloned().collect()),
            None => SeekResult::Gap,
        }
    }
}
