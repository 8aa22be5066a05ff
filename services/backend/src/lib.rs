//! `backend`: the aggregation stream node (spec.md §0 / SPEC_FULL.md §0).
//! Accepts the batches `collector`'s continuous publisher forwards and
//! serves long-poll subscribers, `dbfeed` chief among them.

pub mod cli;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use axum::response::Response;
use axum::Router;
use ds_core::{publish_router, subscribe_router, EventJournal, PublishHook, StreamNode, StreamNodeConfig};
use ds_protocol::Event;
use ds_telemetry::stats::{AlignedScheduler, EventCounter, StatsLog};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Args;

/// Counts every published batch for the per-minute stats sample
/// (SPEC_FULL.md §13); `backend` has no synchronous response to produce,
/// so this is the only reason it installs a [`PublishHook`] at all.
struct StatsHook {
    counter: Arc<EventCounter>,
}

impl PublishHook for StatsHook {
    fn after_publish<'a>(
        &'a self,
        events: &'a [Event],
    ) -> Pin<Box<dyn Future<Output = Option<Response>> + Send + 'a>> {
        self.counter.increment(events.len() as u64);
        Box::pin(async { None })
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to create persistence directory {0}: {1}")]
    PersistenceDir(String, std::io::Error),
    #[error("failed to open stream node: {0}")]
    Stream(#[from] ds_core::StreamNodeError),
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub async fn build(args: &Args) -> Result<(Arc<StreamNode>, Router), BackendError> {
    let node = build_node(args)?;
    node.spawn_dispatch_loop();

    let counter = Arc::new(EventCounter::new());
    spawn_stats_loop(Arc::clone(&counter));
    let hook: Arc<dyn PublishHook> = Arc::new(StatsHook { counter });

    let router = publish_router(Arc::clone(&node), Some(hook))
        .merge(subscribe_router(Arc::clone(&node)))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    Ok((node, router))
}

pub async fn run(args: Args) -> Result<(), BackendError> {
    let (node, router) = build(&args).await?;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BackendError::Bind(addr.clone(), e))?;
    info!(%addr, "backend listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(BackendError::Serve)?;
    node.stop().await;
    Ok(())
}

fn build_node(args: &Args) -> Result<Arc<StreamNode>, BackendError> {
    let config = StreamNodeConfig {
        buffering_time: args.buffering_time(),
        ..Default::default()
    };
    if args.disable_persistence {
        return Ok(Arc::new(StreamNode::new(config)));
    }
    std::fs::create_dir_all(&args.persistence_dir)
        .map_err(|e| BackendError::PersistenceDir(args.persistence_dir.clone(), e))?;
    let journal_path = Path::new(&args.persistence_dir).join("backend.journal");
    let journal = EventJournal::open(journal_path)?;
    Ok(Arc::new(StreamNode::with_journal(config, journal)?))
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
    info!("backend received shutdown signal");
}
