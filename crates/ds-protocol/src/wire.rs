//! The event wire format: a framed stream of `Header: value` blocks followed
//! by an opaque body, per spec.md §6.
//!
//! ```text
//! Event-Id: 3fe3...
//! Source-Id: driver-17
//! Syntax: opaque
//! Timestamp: 2026-07-27T10:00:00Z
//! Application-Id: SmartDriver
//! Event-Type: Vehicle Location
//! Aggregator-Ids: collector-1,backend-1
//! X-Derived-From: 9ac1...
//! Content-Length: 42
//!
//! <42 bytes of body>
//! ```
//!
//! Bodies are opaque to this codec; a stream's parse policy (JSON vs
//! pass-through) is applied by callers, not here.

use crate::event::Event;
use std::collections::HashMap;
use thiserror::Error;

const HDR_EVENT_ID: &str = "Event-Id";
const HDR_SOURCE_ID: &str = "Source-Id";
const HDR_SYNTAX: &str = "Syntax";
const HDR_TIMESTAMP: &str = "Timestamp";
const HDR_APPLICATION_ID: &str = "Application-Id";
const HDR_EVENT_TYPE: &str = "Event-Type";
const HDR_AGGREGATOR_IDS: &str = "Aggregator-Ids";
const HDR_CONTENT_LENGTH: &str = "Content-Length";

/// Per-stream body interpretation. `Opaque` and `Json` are implemented;
/// `SemanticRdf` is recognized on the wire but never parsed in-process —
/// semantic annotation is an external collaborator (spec.md §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Opaque,
    Json,
    SemanticRdf,
}

impl Syntax {
    fn as_wire_str(self) -> &'static str {
        match self {
            Syntax::Opaque => "opaque",
            Syntax::Json => "json",
            Syntax::SemanticRdf => "rdf",
        }
    }

    fn parse_wire_str(s: &str) -> Syntax {
        match s {
            "json" => Syntax::Json,
            "rdf" => Syntax::SemanticRdf,
            _ => Syntax::Opaque,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("buffer does not yet contain a complete frame")]
    Incomplete,
    #[error("malformed event frame: {0}")]
    Malformed(String),
}

/// Serialize one event as a wire frame, tagging `syntax` for the receiver.
pub fn encode(event: &Event, syntax: Syntax) -> Vec<u8> {
    let mut out = Vec::new();
    let mut push_header = |key: &str, value: &str| {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    };

    push_header(HDR_EVENT_ID, &event.event_id);
    push_header(HDR_SOURCE_ID, &event.source_id);
    push_header(HDR_SYNTAX, syntax.as_wire_str());
    push_header(HDR_TIMESTAMP, &event.timestamp);
    push_header(HDR_APPLICATION_ID, &event.application_id);
    push_header(HDR_EVENT_TYPE, &event.event_type);
    if !event.aggregator_id.is_empty() {
        push_header(HDR_AGGREGATOR_IDS, &event.aggregator_id.join(","));
    }
    for (k, v) in &event.extra_headers {
        push_header(k, v);
    }
    push_header(HDR_CONTENT_LENGTH, &event.body.len().to_string());
    out.push(b'\n');
    out.extend_from_slice(&event.body);
    out
}

/// Encode a batch of events back-to-back; this is the body of a publish
/// request or a long-poll flush chunk.
pub fn encode_batch(events: &[Event], syntax: Syntax) -> Vec<u8> {
    let mut out = Vec::new();
    for ev in events {
        out.extend_from_slice(&encode(ev, syntax));
    }
    out
}

/// Decode exactly one frame from the front of `buf`.
///
/// On success returns the parsed event, its declared [`Syntax`], and the
/// number of bytes consumed from `buf`. Returns [`WireError::Incomplete`]
/// if `buf` does not yet hold a full frame (header block not terminated,
/// or body shorter than `Content-Length`) so callers can feed more bytes
/// and retry, matching the incremental-parse discipline spec.md §5 requires
/// of stream-node ingestion.
pub fn decode_one(buf: &[u8]) -> Result<(Event, Syntax, usize), WireError> {
    let header_end = find_header_terminator(buf).ok_or(WireError::Incomplete)?;
    let header_block = &buf[..header_end];
    let headers = parse_headers(header_block)?;

    let content_length: usize = headers
        .get(HDR_CONTENT_LENGTH)
        .ok_or_else(|| WireError::Malformed("missing Content-Length".to_owned()))?
        .parse()
        .map_err(|_| WireError::Malformed("invalid Content-Length".to_owned()))?;

    let body_start = header_end + 1;
    let body_end = body_start
        .checked_add(content_length)
        .ok_or_else(|| WireError::Malformed("Content-Length overflow".to_owned()))?;
    if buf.len() < body_end {
        return Err(WireError::Incomplete);
    }
    let body = buf[body_start..body_end].to_vec();

    let event_id = headers
        .get(HDR_EVENT_ID)
        .ok_or_else(|| WireError::Malformed("missing Event-Id".to_owned()))?
        .clone();
    let source_id = headers.get(HDR_SOURCE_ID).cloned().unwrap_or_default();
    let syntax = headers
        .get(HDR_SYNTAX)
        .map(|s| Syntax::parse_wire_str(s))
        .unwrap_or(Syntax::Opaque);
    let timestamp = headers.get(HDR_TIMESTAMP).cloned().unwrap_or_default();
    let application_id = headers
        .get(HDR_APPLICATION_ID)
        .cloned()
        .unwrap_or_default();
    let event_type = headers.get(HDR_EVENT_TYPE).cloned().unwrap_or_default();
    let aggregator_id = headers
        .get(HDR_AGGREGATOR_IDS)
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_owned).collect())
        .unwrap_or_default();

    let reserved = [
        HDR_EVENT_ID,
        HDR_SOURCE_ID,
        HDR_SYNTAX,
        HDR_TIMESTAMP,
        HDR_APPLICATION_ID,
        HDR_EVENT_TYPE,
        HDR_AGGREGATOR_IDS,
        HDR_CONTENT_LENGTH,
    ];
    let extra_headers = headers
        .into_iter()
        .filter(|(k, _)| !reserved.contains(&k.as_str()))
        .collect();

    let event = Event {
        event_id,
        source_id,
        timestamp,
        application_id,
        event_type,
        aggregator_id,
        body,
        extra_headers,
    };

    Ok((event, syntax, body_end))
}

/// Decode as many complete frames as `buf` currently holds.
///
/// Returns the parsed events and the number of bytes consumed; leftover
/// trailing bytes (an incomplete tail frame) are left unconsumed so the
/// caller can append more data and retry, without losing already-decoded
/// events to one malformed tail.
pub fn decode_all(buf: &[u8]) -> Result<(Vec<Event>, usize), WireError> {
    let mut events = Vec::new();
    let mut offset = 0;
    loop {
        match decode_one(&buf[offset..]) {
            Ok((event, _syntax, consumed)) => {
                offset += consumed;
                events.push(event);
            }
            Err(WireError::Incomplete) => break,
            Err(e) => {
                if events.is_empty() {
                    return Err(e);
                }
                break;
            }
        }
    }
    Ok((events, offset))
}

fn find_header_terminator(buf: &[u8]) -> Option<usize> {
    // A header block is terminated by a blank line: two consecutive `\n`.
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn parse_headers(block: &[u8]) -> Result<HashMap<String, String>, WireError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| WireError::Malformed("header block is not valid UTF-8".to_owned()))?;
    let mut map = HashMap::new();
    for line in text.split('\n') {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| WireError::Malformed(format!("header line missing ':': {line}")))?;
        map.insert(key.trim().to_owned(), value.trim().to_owned());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            event_id: "E1".to_owned(),
            source_id: "driver-17".to_owned(),
            timestamp: "2026-07-27T10:00:00Z".to_owned(),
            application_id: "SmartDriver".to_owned(),
            event_type: "Vehicle Location".to_owned(),
            aggregator_id: vec!["collector-1".to_owned()],
            body: b"{\"lat\":40.4}".to_vec(),
            extra_headers: HashMap::new(),
        }
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let ev = sample_event();
        let frame = encode(&ev, Syntax::Json);
        let (decoded, syntax, consumed) = decode_one(&frame).unwrap();
        assert_eq!(consumed, frame.len());
        assert_eq!(syntax, Syntax::Json);
        assert_eq!(decoded, ev);
    }

    #[test]
    fn decode_one_reports_incomplete_for_partial_frame() {
        let ev = sample_event();
        let frame = encode(&ev, Syntax::Opaque);
        let partial = &frame[..frame.len() - 1];
        assert_eq!(decode_one(partial), Err(WireError::Incomplete));
    }

    #[test]
    fn decode_one_reports_incomplete_when_header_block_not_terminated() {
        let partial_headers = b"Event-Id: E1\nSource-Id: driver-1\n".to_vec();
        assert_eq!(decode_one(&partial_headers), Err(WireError::Incomplete));
    }

    #[test]
    fn decode_all_parses_multiple_back_to_back_frames() {
        let a = sample_event();
        let mut b = sample_event();
        b.event_id = "E2".to_owned();

        let mut buf = encode(&a, Syntax::Opaque);
        buf.extend_from_slice(&encode(&b, Syntax::Opaque));

        let (events, consumed) = decode_all(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, "E1");
        assert_eq!(events[1].event_id, "E2");
    }

    #[test]
    fn decode_all_leaves_incomplete_tail_unconsumed() {
        let a = sample_event();
        let frame_a = encode(&a, Syntax::Opaque);
        let frame_b = encode(&a, Syntax::Opaque);

        let mut buf = frame_a.clone();
        buf.extend_from_slice(&frame_b[..frame_b.len() - 5]);

        let (events, consumed) = decode_all(&buf).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(consumed, frame_a.len());
    }

    #[test]
    fn decode_one_rejects_missing_event_id() {
        let frame = b"Source-Id: x\nContent-Length: 0\n\n".to_vec();
        match decode_one(&frame) {
            Err(WireError::Malformed(_)) => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn extra_headers_round_trip_through_the_wire() {
        let mut ev = sample_event();
        ev.extra_headers
            .insert("X-Derived-From".to_owned(), "E0".to_owned());
        let frame = encode(&ev, Syntax::Opaque);
        let (decoded, _, _) = decode_one(&frame).unwrap();
        assert_eq!(
            decoded.extra_headers.get("X-Derived-From"),
            Some(&"E0".to_owned())
        );
    }
}
