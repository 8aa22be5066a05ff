//! Command-line surface for `collector` (spec.md §6 "CLI (per process)").

use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "collector", about = "Driver-facing frontend stream node")]
pub struct Args {
    /// Port to bind the HTTP surface on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Subscriber buffering window, in seconds.
    #[arg(long, default_value_t = 0)]
    pub buffer: u64,

    /// `tracing` filter directive, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Suppress log output to stderr.
    #[arg(long, default_value_t = false)]
    pub disable_stderr: bool,

    /// Disable the on-disk event journal for this node's own stream.
    #[arg(long, default_value_t = false)]
    pub disable_persistence: bool,

    /// Directory persisted event journals are written under.
    #[arg(long, default_value = "./data")]
    pub persistence_dir: String,

    /// Skip the feedback path entirely for Vehicle Location publishes;
    /// the publish response is empty, same as a non-candidate event.
    #[arg(long, default_value_t = false)]
    pub disable_feedback: bool,

    /// Short-circuit the road-info leg of the feedback path to `DISABLED`
    /// without making the outbound call.
    #[arg(long, default_value_t = false)]
    pub disable_road_info: bool,

    /// Publish endpoint of the backend stream node this collector relays
    /// every published event to.
    #[arg(long)]
    pub backend_stream: String,

    /// `GET /driver_scores` endpoint queried by the feedback handler.
    #[arg(long)]
    pub score_info_url: String,

    /// Road-info service endpoint queried by the feedback handler.
    #[arg(long, default_value = "")]
    pub road_info_url: String,

    /// Record each published event's arrival time to an offline latency
    /// log (spec.md §2 row L); disabled by default.
    #[arg(long, default_value_t = false)]
    pub enable_arrival_tracking: bool,
}

impl Args {
    pub fn buffering_time(&self) -> Duration {
        Duration::from_secs(self.buffer)
    }
}
