//! Per-minute stats sampling (module K) and optional per-event arrival-time
//! tracking (module L) for the stream-node binaries.

pub mod cpu;
pub mod stats;
pub mod tracker;

pub use stats::{AlignedScheduler, EventCounter, StatsLog, StatsSample};
pub use tracker::{Arrival, ArrivalTracker};
