//! JSON body schema carried inside a `Vehicle Location` event (spec.md §8
//! scenario S1: `body:{Location:{latitude:40.4,longitude:-3.7,score:600}}`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    pub score: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    #[serde(rename = "Location")]
    pub location: LocationPayload,
}

impl LocationReport {
    pub fn from_event_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}
