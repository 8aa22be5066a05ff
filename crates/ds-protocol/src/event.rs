//! Canonical event record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The `X-Derived-From` header key used when deriving one event from another.
pub const DERIVED_FROM_HEADER: &str = "X-Derived-From";

/// An immutable telemetry event, as published by a driver app or relayed
/// between stream nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub source_id: String,
    /// RFC3339-like timestamp with timezone, accepted as-is from the producer.
    pub timestamp: String,
    pub application_id: String,
    /// May be empty for untyped events.
    pub event_type: String,
    /// Upstream node identifiers this event passed through, oldest first.
    #[serde(default)]
    pub aggregator_id: Vec<String>,
    /// Opaque bytes, or JSON text when the owning stream parses bodies.
    pub body: Vec<u8>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl Event {
    /// Generate a fresh random event id in canonical text form.
    pub fn new_event_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Build a new event carrying the identity of `self` (one step removed),
    /// per spec.md §3 "Events are derived from an upstream event".
    ///
    /// Copies `source_id`, `timestamp`, `application_id`, `event_type` and
    /// `body` from `self`; assigns a fresh `event_id`; appends `via_node` to
    /// `aggregator_id`; and stamps `X-Derived-From` with `self.event_id`.
    pub fn derive(&self, via_node: &str) -> Event {
        let mut aggregator_id = self.aggregator_id.clone();
        aggregator_id.push(via_node.to_owned());

        let mut extra_headers = self.extra_headers.clone();
        extra_headers.insert(DERIVED_FROM_HEADER.to_owned(), self.event_id.clone());

        Event {
            event_id: Event::new_event_id(),
            source_id: self.source_id.clone(),
            timestamp: self.timestamp.clone(),
            application_id: self.application_id.clone(),
            event_type: self.event_type.clone(),
            aggregator_id,
            body: self.body.clone(),
            extra_headers,
        }
    }

    /// `event_type` with interior whitespace stripped, used to build
    /// per-type sub-stream paths (`<parent>/type/<event_type_no_spaces>`).
    pub fn event_type_no_spaces(&self) -> String {
        self.event_type.chars().filter(|c| !c.is_whitespace()).collect()
    }
}
