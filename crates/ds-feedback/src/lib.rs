//! Synchronous per-publish feedback path (spec.md §4.I): a 10 m short
//! recency gate guarding outbound calls to the scores and road-info
//! services, both bounded by a shared response deadline.

use std::time::{Duration, Instant};

use ds_core::RecencyBuffer;
use ds_geo::Location;
use ds_protocol::{
    scores_text, DriverScore, Event, Feedback, FeedbackStatus, LocationReport, RoadInfoResponse,
    RoadInfoSection, ScoresSection,
};
use tokio::sync::Mutex;
use tracing::warn;

/// Distance threshold below which a publish is considered "no movement"
/// and the feedback path short-circuits without calling either upstream
/// service (spec.md §4.I step 4).
pub const SHORT_GATE_RADIUS_M: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// `application_id` that identifies the driver app's own publishes.
    pub driver_application_id: String,
    /// `event_type` that triggers the feedback path.
    pub driver_event_type: String,
    pub scores_url: String,
    pub road_info_url: String,
    pub deadline: Duration,
    pub disable_feedback: bool,
    pub disable_road_info: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            driver_application_id: "SmartDriver".to_owned(),
            driver_event_type: "Vehicle Location".to_owned(),
            scores_url: String::new(),
            road_info_url: String::new(),
            deadline: Duration::from_secs(5),
            disable_feedback: false,
            disable_road_info: false,
        }
    }
}

/// Whether `event` is eligible for the feedback path at all (spec.md
/// §4.I step 2), independent of whether feedback is enabled.
pub fn is_feedback_candidate(config: &FeedbackConfig, event: &Event) -> bool {
    event.application_id == config.driver_application_id
        && event.event_type == config.driver_event_type
}

pub struct FeedbackHandler {
    config: FeedbackConfig,
    http: reqwest::Client,
    short_gate: Mutex<RecencyBuffer<String, Location>>,
}

enum ScoresOutcome {
    Timeout,
    Error,
    NoMovement,
    RoadInfoOnly { previous: Location },
    Scored { previous: Location, scores: Vec<DriverScore> },
}

impl FeedbackHandler {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            short_gate: Mutex::new(RecencyBuffer::new()),
        }
    }

    /// Periodically age the short gate's two generations. Call on whatever
    /// cadence the owning service considers its recency window.
    pub async fn roll_short_gate(&self) {
        self.short_gate.lock().await.roll();
    }

    /// Whether `event` should enter the feedback path at all (spec.md
    /// §4.I step 2), independent of whether feedback itself is enabled.
    pub fn is_candidate(&self, event: &Event) -> bool {
        is_feedback_candidate(&self.config, event)
    }

    /// Run the full feedback algorithm for a publish's first matching
    /// event. Callers must have already checked [`is_feedback_candidate`].
    ///
    /// Returns `None` when feedback is disabled (spec.md §4.I step 2: "else
    /// finish with 200" — no body, not a disabled-status payload).
    pub async fn handle(&self, event: &Event) -> Option<Feedback> {
        if self.config.disable_feedback {
            return None;
        }

        let report = match LocationReport::from_event_body(&event.body) {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "feedback handler could not parse Vehicle Location body");
                return Some(Feedback::new(
                    ScoresSection::status_only(FeedbackStatus::ServiceError),
                    RoadInfoSection::status_only(FeedbackStatus::NoData),
                ));
            }
        };
        let user_id = event.source_id.clone();
        let location = Location::new(report.location.latitude, report.location.longitude);
        let score = report.location.score;

        let deadline = Instant::now() + self.config.deadline;

        if !self.gate_passes_short_range(&user_id, location).await {
            return Some(Feedback::new(
                ScoresSection::status_only(FeedbackStatus::UsePrevious),
                RoadInfoSection::status_only(FeedbackStatus::UsePrevious),
            ));
        }

        let feedback = match self.request_scores(&user_id, location, score, deadline).await {
            ScoresOutcome::Timeout => Feedback::new(
                ScoresSection::status_only(FeedbackStatus::ServiceTimeout),
                RoadInfoSection::status_only(FeedbackStatus::NoData),
            ),
            ScoresOutcome::Error => Feedback::new(
                ScoresSection::status_only(FeedbackStatus::ServiceError),
                RoadInfoSection::status_only(FeedbackStatus::NoData),
            ),
            ScoresOutcome::NoMovement => Feedback::new(
                ScoresSection::status_only(FeedbackStatus::UsePrevious),
                RoadInfoSection::status_only(FeedbackStatus::UsePrevious),
            ),
            ScoresOutcome::RoadInfoOnly { previous } => {
                let road_info = self.request_road_info(location, previous, deadline).await;
                Feedback::new(ScoresSection::status_only(FeedbackStatus::UsePrevious), road_info)
            }
            ScoresOutcome::Scored { previous, scores } => {
                let road_info = self.request_road_info(location, previous, deadline).await;
                Feedback::new(
                    ScoresSection {
                        status: FeedbackStatus::Ok,
                        close_scores: scores,
                    },
                    road_info,
                )
            }
        };
        Some(feedback)
    }

    /// Returns `true` if the user has moved far enough for the feedback
    /// path to proceed; refreshes the gate's entry either way.
    async fn gate_passes_short_range(&self, user_id: &str, location: Location) -> bool {
        let mut gate = self.short_gate.lock().await;
        match gate.get(&user_id.to_owned()).copied() {
            Some(previous) => {
                let moved = previous.distance_to(&location) >= SHORT_GATE_RADIUS_M;
                if moved {
                    gate.set(user_id.to_owned(), location);
                } else {
                    gate.refresh(&user_id.to_owned());
                }
                moved
            }
            None => {
                gate.set(user_id.to_owned(), location);
                true
            }
        }
    }

    async fn request_scores(
        &self,
        user_id: &str,
        location: Location,
        score: i64,
        deadline: Instant,
    ) -> ScoresOutcome {
        let Some(remaining) = remaining_until(deadline) else {
            return ScoresOutcome::Timeout;
        };
        let send = self.http.get(&self.config.scores_url).query(&[
            ("user", user_id.to_owned()),
            ("latitude", location.lat.to_string()),
            ("longitude", location.long.to_string()),
            ("score", score.to_string()),
        ]);

        let response = match tokio::time::timeout(remaining, send.send()).await {
            Err(_) => return ScoresOutcome::Timeout,
            Ok(Err(e)) => {
                warn!(error = %e, "scores request failed");
                return ScoresOutcome::Error;
            }
            Ok(Ok(resp)) => resp,
        };
        if !response.status().is_success() {
            return ScoresOutcome::Error;
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => return ScoresOutcome::Error,
        };
        match scores_text::parse(&body) {
            Ok(scores_text::ScoresResponse::NoMovement) => ScoresOutcome::NoMovement,
            Ok(scores_text::ScoresResponse::RoadInfoOnly { previous }) => ScoresOutcome::RoadInfoOnly {
                previous: Location::new(previous.0, previous.1),
            },
            Ok(scores_text::ScoresResponse::Scored { previous, scores }) => ScoresOutcome::Scored {
                previous: Location::new(previous.0, previous.1),
                scores: scores
                    .into_iter()
                    .map(|line| DriverScore {
                        latitude: line.lat,
                        longitude: line.long,
                        score: line.score,
                    })
                    .collect(),
            },
            Err(e) => {
                warn!(error = %e, "scores response did not match the expected grammar");
                ScoresOutcome::Error
            }
        }
    }

    async fn request_road_info(
        &self,
        current: Location,
        previous: Location,
        deadline: Instant,
    ) -> RoadInfoSection {
        if self.config.disable_road_info {
            return RoadInfoSection::status_only(FeedbackStatus::Disabled);
        }
        let Some(remaining) = remaining_until(deadline) else {
            return RoadInfoSection::status_only(FeedbackStatus::ServiceTimeout);
        };

        let send = self.http.get(&self.config.road_info_url).query(&[
            ("currentLat", current.lat.to_string()),
            ("currentLong", current.long.to_string()),
            ("previousLat", previous.lat.to_string()),
            ("previousLong", previous.long.to_string()),
        ]);

        let response = match tokio::time::timeout(remaining, send.send()).await {
            Err(_) => return RoadInfoSection::status_only(FeedbackStatus::ServiceTimeout),
            Ok(Err(e)) => {
                warn!(error = %e, "road-info request failed");
                return RoadInfoSection::status_only(FeedbackStatus::ServiceError);
            }
            Ok(Ok(resp)) => resp,
        };
        if !response.status().is_success() {
            return RoadInfoSection::status_only(FeedbackStatus::ServiceError);
        }
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(_) => return RoadInfoSection::status_only(FeedbackStatus::ServiceError),
        };
        if body.is_empty() {
            return RoadInfoSection::status_only(FeedbackStatus::NoData);
        }
        match serde_json::from_slice::<RoadInfoResponse>(&body) {
            Ok(parsed) => RoadInfoSection {
                status: FeedbackStatus::Ok,
                road_type: Some(parsed.link_type),
                max_speed: Some(parsed.max_speed),
            },
            Err(e) => {
                warn!(error = %e, "road-info response was not the expected JSON shape");
                RoadInfoSection::status_only(FeedbackStatus::ServiceError)
            }
        }
    }
}

/// gzip-compress the JSON serialization of `feedback`, for the
/// `Content-Encoding: gzip` response spec.md §4.I requires.
pub fn compress_response(feedback: &Feedback) -> std::io::Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let json = serde_json::to_vec(feedback).expect("Feedback always serializes");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    encoder.finish()
}

fn remaining_until(deadline: Instant) -> Option<Duration> {
    let now = Instant::now();
    if now >= deadline {
        None
    } else {
        Some(deadline - now)
    }
}
