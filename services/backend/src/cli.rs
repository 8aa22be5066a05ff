//! Command-line surface for `backend` (spec.md §6 "CLI (per process)"),
//! restricted to the flags this binary actually uses (SPEC_FULL.md §15).

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Backend aggregation stream node")]
pub struct Args {
    #[arg(long, default_value_t = 8081)]
    pub port: u16,

    /// Subscriber buffering window, in seconds.
    #[arg(long, default_value_t = 1)]
    pub buffer: u64,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub disable_stderr: bool,

    #[arg(long, default_value_t = false)]
    pub disable_persistence: bool,

    #[arg(long, default_value = "./data")]
    pub persistence_dir: String,
}

impl Args {
    pub fn buffering_time(&self) -> Duration {
        Duration::from_secs(self.buffer)
    }
}
