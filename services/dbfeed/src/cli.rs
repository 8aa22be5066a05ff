//! Command-line surface for `dbfeed` (spec.md §6 "CLI (per process)"),
//! restricted to the flags this binary actually uses (SPEC_FULL.md §15).

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "dbfeed", about = "Relay-client consumer: filter + persist")]
pub struct Args {
    /// Port the filtered stream's diagnostic subscribe surface is served on.
    #[arg(long, default_value_t = 8082)]
    pub port: u16,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, default_value_t = false)]
    pub disable_stderr: bool,

    #[arg(long, default_value_t = false)]
    pub disable_persistence: bool,

    #[arg(long, default_value = "./data")]
    pub persistence_dir: String,

    /// `GET /<path>/stream` endpoint of the `backend` node to relay from.
    #[arg(long)]
    pub backend_stream: String,
}
