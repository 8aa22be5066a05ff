//! `GET /driver_scores` and `GET /dump_index` (spec.md §4.J, §6).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ds_core::{RecencyBuffer, ScoreIndex};
use ds_geo::Location;
use ds_protocol::{scores_text, HttpErrorEnvelope};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

/// Short-gate threshold: below this, the caller gets `#*` and nothing is
/// recorded (spec.md §4.J).
const SHORT_GATE_RADIUS_M: f64 = 10.0;
/// Long-gate threshold: below this (but past the short gate), the caller
/// gets road-info-only and no score-index write.
const LONG_GATE_RADIUS_M: f64 = 300.0;
/// Cadence on which both recency buffers age their generations.
pub const GATE_ROLL_INTERVAL_SECS: u64 = 60;

pub struct ScoresState {
    pub index: Mutex<ScoreIndex>,
    short_gate: Mutex<RecencyBuffer<String, Location>>,
    long_gate: Mutex<RecencyBuffer<String, Location>>,
}

impl ScoresState {
    pub fn new(index: ScoreIndex) -> Self {
        Self {
            index: Mutex::new(index),
            short_gate: Mutex::new(RecencyBuffer::new()),
            long_gate: Mutex::new(RecencyBuffer::new()),
        }
    }

    pub async fn roll_gates(&self) {
        self.short_gate.lock().await.roll();
        self.long_gate.lock().await.roll();
    }
}

#[derive(Debug, Deserialize)]
pub struct ScoresQuery {
    user: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    score: Option<String>,
}

fn unprocessable(message: impl Into<String>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        axum::Json(HttpErrorEnvelope::new("bad_query_argument", message)),
    )
        .into_response()
}

/// `GET /driver_scores?user=&latitude=&longitude=&score=`.
pub async fn driver_scores(
    State(state): State<Arc<ScoresState>>,
    Query(query): Query<ScoresQuery>,
) -> Response {
    let Some(user) = query.user.filter(|s| !s.is_empty()) else {
        return unprocessable("missing required query argument: user");
    };
    let Some(latitude) = query
        .latitude
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
    else {
        return unprocessable("missing or malformed query argument: latitude");
    };
    let Some(longitude) = query
        .longitude
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
    else {
        return unprocessable("missing or malformed query argument: longitude");
    };
    let Some(score) = query.score.as_deref().and_then(|s| s.parse::<i64>().ok()) else {
        return unprocessable("missing or malformed query argument: score");
    };

    let location = Location::new(latitude, longitude);

    let mut short_gate = state.short_gate.lock().await;
    let previous_short = short_gate.get(&user).copied();
    let moved_short = previous_short
        .map(|p| p.distance_to(&location) >= SHORT_GATE_RADIUS_M)
        .unwrap_or(true);
    if !moved_short {
        short_gate.refresh(&user);
        drop(short_gate);
        state.long_gate.lock().await.refresh(&user);
        return (
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            scores_text::format_no_movement(),
        )
            .into_response();
    }
    short_gate.set(user.clone(), location);
    drop(short_gate);

    let mut long_gate = state.long_gate.lock().await;
    let previous_long = long_gate.get(&user).copied();
    let moved_long = previous_long
        .map(|p| p.distance_to(&location) >= LONG_GATE_RADIUS_M)
        .unwrap_or(true);

    if !moved_long {
        long_gate.refresh(&user);
        let previous = previous_long.unwrap_or(location);
        return (
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            scores_text::format_road_info_only((previous.lat, previous.long)),
        )
            .into_response();
    }

    let previous = previous_long.unwrap_or(location);
    long_gate.set(user.clone(), location);
    drop(long_gate);

    let mut index = state.index.lock().await;
    let hits = index.lookup(location, &user);
    let scores: Vec<(f64, f64, i64)> = hits
        .into_iter()
        .map(|(loc, s)| (loc.lat, loc.long, s))
        .collect();
    index.insert(location, user, score);
    drop(index);

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain")],
        scores_text::format_scored((previous.lat, previous.long), &scores),
    )
        .into_response()
}

/// `GET /dump_index` — a diagnostic hook, not a data API.
pub async fn dump_index(State(state): State<Arc<ScoresState>>) -> Response {
    let index = state.index.lock().await;
    info!(rows = index.len(), "score index dump requested");
    StatusCode::OK.into_response()
}
