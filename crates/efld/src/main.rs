use anyhow::{Context, Result};
use efl_core::{AttendanceRecorder, FaceClassifier};
use efl_store::Database;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod encoder;
mod engine;
mod ingest;
mod preview;
mod snapshot;
mod state;

use config::Config;
use encoder::HttpEncoder;
use engine::Engine;
use ingest::FramePipeline;
use snapshot::SnapshotStore;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("efld=info,tower_http=info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "efld starting");

    let config = Config::from_env();
    tracing::info!(
        listen = %config.listen_addr,
        db = %config.db_path.display(),
        encoder = %config.encoder_url,
        threshold = config.match_threshold,
        cooldown_secs = config.gate.cooldown.as_secs(),
        quiet_window_secs = ?config.gate.quiet_window.map(|w| w.as_secs()),
        "configuration loaded"
    );

    let db = Database::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let encoder = HttpEncoder::new(&config.encoder_url, config.encoder_timeout)
        .context("failed to build encoder client")?;
    let classifier = FaceClassifier::new(Arc::new(encoder), config.match_threshold);

    let engine = Arc::new(Engine::new(Arc::new(db.clone()), classifier));
    engine
        .refresh()
        .await
        .context("failed to load reference set")?;

    let snapshot = SnapshotStore::new();
    let recorder = Arc::new(AttendanceRecorder::new(Arc::new(db.clone()), config.gate));
    let pipeline = Arc::new(FramePipeline::new(
        snapshot.clone(),
        engine.clone(),
        Arc::new(db.clone()),
        recorder,
    ));

    let state = AppState {
        db,
        engine,
        pipeline,
        snapshot,
        frame_interval: config.frame_interval,
        preview_interval: config.preview_interval,
    };

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "efld ready");

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("efld shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
