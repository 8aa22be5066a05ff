//! `scoresd`: the scores REST endpoint over `ds-core`'s spatial score
//! index (spec.md §0 / SPEC_FULL.md §11).

pub mod cli;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use ds_core::ScoreIndex;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::Args;
use crate::handlers::{driver_scores, dump_index, ScoresState, GATE_ROLL_INTERVAL_SECS};

#[derive(Debug, Error)]
pub enum ScoresdError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

pub fn build(args: &Args) -> (Arc<ScoresState>, Router) {
    let mut index = ScoreIndex::new(args.search_radius_m, args.ttl());
    index.allow_same_user = args.allow_same_user;
    let state = Arc::new(ScoresState::new(index));

    spawn_gate_roll_loop(Arc::clone(&state));
    spawn_index_roll_loop(Arc::clone(&state));

    let router = Router::new()
        .route("/driver_scores", get(driver_scores))
        .route("/dump_index", get(dump_index))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state.clone());

    (state, router)
}

pub async fn run(args: Args) -> Result<(), ScoresdError> {
    let (_state, router) = build(&args);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ScoresdError::Bind(addr.clone(), e))?;
    info!(%addr, "scoresd listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ScoresdError::Serve)?;
    Ok(())
}

fn spawn_gate_roll_loop(state: Arc<ScoresState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(GATE_ROLL_INTERVAL_SECS));
        loop {
            interval.tick().await;
            state.roll_gates().await;
        }
    });
}

fn spawn_index_roll_loop(state: Arc<ScoresState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(GATE_ROLL_INTERVAL_SECS));
        loop {
            interval.tick().await;
            state.index.lock().await.roll();
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
    info!("scoresd received shutdown signal");
}
