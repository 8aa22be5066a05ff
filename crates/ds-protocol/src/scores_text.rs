//! The plain-text line grammar used by the scores endpoint (spec.md §4.J).
//!
//! ```text
//! #+40.399,-3.699\r\n
//! 40.41,-3.71,500\r\n
//! 40.42,-3.72,700\r\n
//! ```
//! or `#i<lat>,<long>\r\n` (road-info only), or `#*\r\n` (no movement).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreLine {
    pub lat: f64,
    pub long: f64,
    pub score: i64,
}

/// The parsed response body of a `GET /driver_scores` call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoresResponse {
    /// `#*` — the location changed too little to matter at all.
    NoMovement,
    /// `#i<lat>,<long>` — road-info only; `previous` is the prior location.
    RoadInfoOnly { previous: (f64, f64) },
    /// `#+<lat>,<long>` followed by up to 10 `lat,long,score` lines.
    Scored {
        previous: (f64, f64),
        scores: Vec<ScoreLine>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ScoresTextError {
    #[error("empty response body")]
    Empty,
    #[error("unrecognized marker line: {0}")]
    UnknownMarker(String),
    #[error("malformed coordinate pair: {0}")]
    MalformedCoordinates(String),
    #[error("malformed score line: {0}")]
    MalformedScoreLine(String),
}

/// Maximum number of nearby-score lines emitted after a `#+` marker.
pub const MAX_SCORE_LINES: usize = 10;

fn parse_pair(s: &str) -> Result<(f64, f64), ScoresTextError> {
    let (a, b) = s
        .split_once(',')
        .ok_or_else(|| ScoresTextError::MalformedCoordinates(s.to_owned()))?;
    let lat: f64 = a
        .parse()
        .map_err(|_| ScoresTextError::MalformedCoordinates(s.to_owned()))?;
    let long: f64 = b
        .parse()
        .map_err(|_| ScoresTextError::MalformedCoordinates(s.to_owned()))?;
    Ok((lat, long))
}

pub fn parse(body: &str) -> Result<ScoresResponse, ScoresTextError> {
    let mut lines = body.split("\r\n").filter(|l| !l.is_empty());
    let first = lines.next().ok_or(ScoresTextError::Empty)?;

    if first == "#*" {
        return Ok(ScoresResponse::NoMovement);
    }
    if let Some(rest) = first.strip_prefix("#i") {
        let previous = parse_pair(rest)?;
        return Ok(ScoresResponse::RoadInfoOnly { previous });
    }
    if let Some(rest) = first.strip_prefix("#+") {
        let previous = parse_pair(rest)?;
        let mut scores = Vec::new();
        for line in lines {
            let mut parts = line.splitn(3, ',');
            let lat: f64 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ScoresTextError::MalformedScoreLine(line.to_owned()))?;
            let long: f64 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ScoresTextError::MalformedScoreLine(line.to_owned()))?;
            let score: i64 = parts
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ScoresTextError::MalformedScoreLine(line.to_owned()))?;
            scores.push(ScoreLine { lat, long, score });
        }
        return Ok(ScoresResponse::Scored { previous, scores });
    }

    Err(ScoresTextError::UnknownMarker(first.to_owned()))
}

pub fn format_no_movement() -> String {
    "#*\r\n".to_owned()
}

pub fn format_road_info_only(previous: (f64, f64)) -> String {
    format!("#i{},{}\r\n", previous.0, previous.1)
}

pub fn format_scored(previous: (f64, f64), scores: &[(f64, f64, i64)]) -> String {
    let mut out = format!("#+{},{}\r\n", previous.0, previous.1);
    for (lat, long, score) in scores.iter().take(MAX_SCORE_LINES) {
        out.push_str(&format!("{lat},{long},{score}\r\n"));
    }
    out
}
