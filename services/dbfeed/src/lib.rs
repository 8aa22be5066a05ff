//! `dbfeed`: relays the backend stream through a configurable event-type
//! filter onto a persisted, read-only local stream (spec.md §0).

pub mod cli;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use ds_core::{
    subscribe_router, EventJournal, EventTypeRelay, RelayFilter, StreamNode, StreamNodeConfig,
};
use ds_net::{RelayClient, RelayClientConfig};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use crate::cli::Args;

/// `application_id` the filter keeps; matches the driver app identifier
/// used throughout the rest of the workspace (`ds_feedback::FeedbackConfig`
/// default). `dbfeed`'s filter is fully general (`ds_core::RelayFilter`
/// supports narrowing to specific event types too) but spec.md's CLI table
/// names no flag for it, so the default keeps every Vehicle event type.
const FILTERED_APPLICATION_ID: &str = "SmartDriver";

#[derive(Debug, Error)]
pub enum DbfeedError {
    #[error("failed to create persistence directory {0}: {1}")]
    PersistenceDir(String, std::io::Error),
    #[error("failed to open stream node: {0}")]
    Stream(#[from] ds_core::StreamNodeError),
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub async fn build(
    args: &Args,
) -> Result<(Arc<StreamNode>, Router, oneshot::Sender<()>), DbfeedError> {
    let raw_node = Arc::new(StreamNode::new(StreamNodeConfig {
        allow_publish: false,
        ..Default::default()
    }));
    raw_node.spawn_dispatch_loop();

    let filtered_node = build_filtered_node(args)?;
    filtered_node.spawn_dispatch_loop();

    let filter = RelayFilter {
        application_id: FILTERED_APPLICATION_ID.to_owned(),
        event_types: HashSet::new(),
    };
    let (_relay, _forward_handle) =
        EventTypeRelay::spawn_into(Arc::clone(&raw_node), Arc::clone(&filtered_node), filter).await;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let client = RelayClient::new(
        RelayClientConfig {
            upstream_url: args.backend_stream.clone(),
            client_label: Some("dbfeed".to_owned()),
            ..Default::default()
        },
        Arc::clone(&raw_node),
    );
    tokio::spawn(async move {
        client.run(shutdown_rx).await;
    });

    let router = subscribe_router(Arc::clone(&filtered_node))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    Ok((filtered_node, router, shutdown_tx))
}

pub async fn run(args: Args) -> Result<(), DbfeedError> {
    let (node, router, relay_shutdown) = build(&args).await?;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DbfeedError::Bind(addr.clone(), e))?;
    info!(%addr, upstream = %args.backend_stream, "dbfeed listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = relay_shutdown.send(());
        })
        .await
        .map_err(DbfeedError::Serve)?;
    node.stop().await;
    Ok(())
}

fn build_filtered_node(args: &Args) -> Result<Arc<StreamNode>, DbfeedError> {
    let config = StreamNodeConfig {
        allow_publish: false,
        ..Default::default()
    };
    if args.disable_persistence {
        return Ok(Arc::new(StreamNode::new(config)));
    }
    std::fs::create_dir_all(&args.persistence_dir)
        .map_err(|e| DbfeedError::PersistenceDir(args.persistence_dir.clone(), e))?;
    let journal_path = Path::new(&args.persistence_dir).join("dbfeed.journal");
    let journal = EventJournal::open(journal_path)?;
    Ok(Arc::new(StreamNode::with_journal(config, journal)?))
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
    info!("dbfeed received shutdown signal");
}
