//! Command-line surface for `scoresd` (spec.md §6 "CLI (per process)"),
//! restricted to the flags this binary actually uses (SPEC_FULL.md §15).

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "scoresd", about = "Scores REST endpoint over the spatial score index")]
pub struct Args {
    #[arg(long, default_value_t = 8090)]
    pub port: u16,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub disable_stderr: bool,

    /// Score index entry lifetime, in seconds (spec.md §4.C "ttl").
    #[arg(long, default_value_t = 600)]
    pub index_ttl: u64,

    /// Permit a lookup to return the caller's own stale (>1h) entries;
    /// spec.md §9's testing-mode escape hatch for the same-user exclusion.
    #[arg(long, default_value_t = false)]
    pub allow_same_user: bool,

    /// Radius, in meters, used both for a row's bounding box at insert
    /// time and for index-cell sizing (spec.md §4.C "search_radius");
    /// not itself a named CLI flag in spec.md, but required to construct
    /// the index and therefore exposed here (see DESIGN.md).
    #[arg(long, default_value_t = 1000.0)]
    pub search_radius_m: f64,
}

impl Args {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl)
    }
}
