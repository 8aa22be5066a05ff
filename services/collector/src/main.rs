use clap::Parser;
use collector::cli::Args;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level, args.disable_stderr);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "collector starting");

    if let Err(e) = collector::run(args).await {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(log_level: &str, disable_stderr: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_owned()));
    if disable_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
