//! The `Feedback` response assembled per publish request (spec.md §3, §6).

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Status of one feedback section. The numeric values are the frozen wire
/// codes from spec.md §6 and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum FeedbackStatus {
    Ok = 1,
    Disabled = 11,
    UsePrevious = 21,
    NoData = 22,
    ServiceTimeout = 31,
    ServiceError = 32,
}

/// One anonymous nearby driver's score, as returned in `scores.closeScores`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverScore {
    pub latitude: f64,
    pub longitude: f64,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoresSection {
    pub status: FeedbackStatus,
    #[serde(rename = "closeScores")]
    pub close_scores: Vec<DriverScore>,
}

impl ScoresSection {
    pub fn status_only(status: FeedbackStatus) -> Self {
        Self {
            status,
            close_scores: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadInfoSection {
    pub status: FeedbackStatus,
    #[serde(rename = "roadType", skip_serializing_if = "Option::is_none")]
    pub road_type: Option<String>,
    #[serde(rename = "maxSpeed", skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
}

impl RoadInfoSection {
    pub fn status_only(status: FeedbackStatus) -> Self {
        Self {
            status,
            road_type: None,
            max_speed: None,
        }
    }
}

/// The structured per-request feedback object, serialized as gzip-compressed
/// JSON (spec.md §4.I).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Reserved for future use; always an empty object today.
    pub recommendation: serde_json::Value,
    pub scores: ScoresSection,
    #[serde(rename = "roadInfo")]
    pub road_info: RoadInfoSection,
}

impl Feedback {
    pub fn new(scores: ScoresSection, road_info: RoadInfoSection) -> Self {
        Self {
            recommendation: serde_json::json!({}),
            scores,
            road_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_serializes_with_frozen_field_names() {
        let fb = Feedback::new(
            ScoresSection {
                status: FeedbackStatus::Ok,
                close_scores: vec![DriverScore {
                    latitude: 40.41,
                    longitude: -3.71,
                    score: 500,
                }],
            },
            RoadInfoSection {
                status: FeedbackStatus::Ok,
                road_type: Some("urban".to_owned()),
                max_speed: Some(50.0),
            },
        );
        let json = serde_json::to_value(&fb).unwrap();
        assert_eq!(json["scores"]["status"], 1);
        assert_eq!(json["scores"]["closeScores"][0]["score"], 500);
        assert_eq!(json["roadInfo"]["status"], 1);
        assert_eq!(json["roadInfo"]["roadType"], "urban");
        assert_eq!(json["roadInfo"]["maxSpeed"], 50.0);
    }

    #[test]
    fn road_info_omits_null_fields_when_status_only() {
        let section = RoadInfoSection::status_only(FeedbackStatus::NoData);
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["status"], 22);
        assert!(json.get("roadType").is_none());
        assert!(json.get("maxSpeed").is_none());
    }
}
