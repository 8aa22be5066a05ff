//! Wire-level types shared by every node in the driver event streaming
//! pipeline: the canonical [`Event`] record, its framed wire codec, the
//! `Feedback` JSON schema, and the scores-endpoint plain-text line grammar.

pub mod event;
pub mod feedback;
pub mod http_types;
pub mod location_report;
pub mod scores_text;
pub mod wire;

pub use event::{Event, DERIVED_FROM_HEADER};
pub use feedback::{DriverScore, Feedback, FeedbackStatus, RoadInfoSection, ScoresSection};
pub use http_types::{HttpErrorEnvelope, RoadInfoResponse, SubscribeQuery};
pub use location_report::{LocationPayload, LocationReport};
pub use wire::{Syntax, WireError};
