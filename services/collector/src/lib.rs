//! `collector`: the driver-facing frontend stream node (spec.md §0 / §4,
//! SPEC_FULL.md §0). Owns the publish/subscribe HTTP surface, the
//! synchronous feedback path, and the continuous publisher that relays
//! every publish onward to a `backend` node.

pub mod cli;
pub mod feedback_hook;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use ds_core::{
    publish_router, subscribe_router, EventJournal, EventTypeRelay, PublishHook, RelayFilter,
    StreamNode, StreamNodeConfig,
};
use ds_feedback::{FeedbackConfig, FeedbackHandler};
use ds_net::{ContinuousPublisher, ContinuousPublisherConfig};
use ds_telemetry::stats::{AlignedScheduler, EventCounter, StatsLog};
use ds_telemetry::tracker::ArrivalTracker;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Args;
use crate::feedback_hook::FeedbackPublishHook;

/// `application_id` the per-event-type sub-streams fan out from (spec.md
/// §4.F, module F); matches `ds_feedback::FeedbackConfig`'s default driver
/// app identifier.
const FANOUT_APPLICATION_ID: &str = "SmartDriver";

/// Event types each mounted at `/type/<event_type_no_spaces>` off this
/// node, one [`EventTypeRelay`] per type.
const FANOUT_EVENT_TYPES: &[&str] = &[
    "Vehicle Location",
    "High Speed",
    "High Acceleration",
    "High Deceleration",
    "High Heart Rate",
    "Data Section",
];

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("failed to create persistence directory {0}: {1}")]
    PersistenceDir(String, std::io::Error),
    #[error("failed to open stream node: {0}")]
    Stream(#[from] ds_core::StreamNodeError),
    #[error("failed to open arrival tracker log: {0}")]
    ArrivalTracker(std::io::Error),
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Assembles the stream node, feedback handler, continuous publisher, and
/// the HTTP router over them, without binding a listener. Split out from
/// [`run`] so tests can drive the router directly against an ephemeral
/// port.
pub async fn build(args: &Args) -> Result<(Arc<StreamNode>, Router), CollectorError> {
    let node = build_node(args)?;
    node.spawn_dispatch_loop();

    let feedback = Arc::new(FeedbackHandler::new(FeedbackConfig {
        scores_url: args.score_info_url.clone(),
        road_info_url: args.road_info_url.clone(),
        disable_feedback: args.disable_feedback,
        disable_road_info: args.disable_road_info,
        ..Default::default()
    }));
    spawn_short_gate_roll(Arc::clone(&feedback));

    let continuous = Arc::new(ContinuousPublisher::new(ContinuousPublisherConfig {
        target_url: args.backend_stream.clone(),
        buffering_time: args.buffering_time(),
        ..Default::default()
    }));
    Arc::clone(&continuous).spawn_flush_loop();

    let tracker = if args.enable_arrival_tracking {
        let path = Path::new(&args.persistence_dir).join("collector-arrivals.csv");
        let (tracker, _handle) =
            ArrivalTracker::spawn(&path).map_err(CollectorError::ArrivalTracker)?;
        Some(tracker)
    } else {
        None
    };

    let counter = Arc::new(EventCounter::new());
    spawn_stats_loop(Arc::clone(&counter));

    let hook: Arc<dyn PublishHook> = Arc::new(FeedbackPublishHook {
        feedback,
        continuous,
        tracker,
        counter,
    });

    let mut router: Router = publish_router(Arc::clone(&node), Some(hook))
        .merge(subscribe_router(Arc::clone(&node)));

    for event_type in FANOUT_EVENT_TYPES {
        let sub_stream = spawn_event_type_relay(Arc::clone(&node), event_type).await;
        let mount = format!("/type/{}", no_spaces(event_type));
        router = router.nest(&mount, subscribe_router(sub_stream));
    }

    let router = router.layer(tower_http::trace::TraceLayer::new_for_http());

    Ok((node, router))
}

/// Taps `parent` for `event_type` and returns the read-only child stream
/// mounted at `/type/<event_type_no_spaces>` (spec.md §4.F), matching
/// `EventTypeRelays` in the original collector entrypoint.
async fn spawn_event_type_relay(parent: Arc<StreamNode>, event_type: &str) -> Arc<StreamNode> {
    let filter = RelayFilter {
        application_id: FANOUT_APPLICATION_ID.to_owned(),
        event_types: HashSet::from([event_type.to_owned()]),
    };
    let (relay, _forward_handle) = EventTypeRelay::spawn(parent, filter).await;
    relay.child.spawn_dispatch_loop();
    relay.child
}

fn no_spaces(event_type: &str) -> String {
    event_type.chars().filter(|c| !c.is_whitespace()).collect()
}

pub async fn run(args: Args) -> Result<(), CollectorError> {
    let (node, router) = build(&args).await?;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| CollectorError::Bind(addr.clone(), e))?;
    info!(%addr, "collector listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(CollectorError::Serve)?;
    node.stop().await;
    Ok(())
}

fn build_node(args: &Args) -> Result<Arc<StreamNode>, CollectorError> {
    let config = StreamNodeConfig {
        buffering_time: args.buffering_time(),
        ..Default::default()
    };
    if args.disable_persistence {
        return Ok(Arc::new(StreamNode::new(config)));
    }
    std::fs::create_dir_all(&args.persistence_dir)
        .map_err(|e| CollectorError::PersistenceDir(args.persistence_dir.clone(), e))?;
    let journal_path = Path::new(&args.persistence_dir).join("collector.journal");
    let journal = EventJournal::open(journal_path)?;
    Ok(Arc::new(StreamNode::with_journal(config, journal)?))
}

fn spawn_short_gate_roll(feedback: Arc<FeedbackHandler>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            feedback.roll_short_gate().await;
        }
    });
}

fn spawn_stats_loop(counter: Arc<EventCounter>) {
    tokio::spawn(async move {
        let log = StatsLog::default();
        let mut scheduler = AlignedScheduler::new();
        loop {
            let sample = scheduler.tick(&counter).await;
            log.record(sample);
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("collector received shutdown signal");
}
