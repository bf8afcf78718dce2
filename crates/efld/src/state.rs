use crate::engine::Engine;
use crate::ingest::FramePipeline;
use crate::snapshot::SnapshotStore;
use efl_store::Database;
use std::sync::Arc;
use std::time::Duration;

/// Shared handles for every request handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<Engine>,
    pub pipeline: Arc<FramePipeline>,
    pub snapshot: SnapshotStore,
    pub frame_interval: Duration,
    pub preview_interval: Duration,
}
