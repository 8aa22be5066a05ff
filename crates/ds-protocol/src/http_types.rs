//! Small HTTP-facing types shared between stream-node binaries.

use serde::{Deserialize, Serialize};

/// Query parameters accepted by `GET /<path>/stream` and `/compressed`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscribeQuery {
    #[serde(default)]
    pub last_seen_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub deflate: bool,
}

/// The road-info service's JSON response body (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadInfoResponse {
    #[serde(rename = "linkType")]
    pub link_type: String,
    #[serde(rename = "maxSpeed")]
    pub max_speed: f64,
}

/// A uniform error envelope for non-2xx stream-node responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
}

impl HttpErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
