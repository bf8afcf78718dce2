//! Camera frame ingestion over WebSocket.
//!
//! Every admitted binary frame is published as the current snapshot,
//! classified, gated and answered with at most one text message.

use crate::engine::Engine;
use crate::snapshot::SnapshotStore;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use efl_core::{AttendanceRecorder, AttendanceType, ClassificationResult, Directory, RecordOutcome};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Message sent back to the camera client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Success { name: String, kind: AttendanceType },
    CannotClassify,
    Duplicate,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Success { name, kind } => write!(f, "success:{name} {kind}"),
            Feedback::CannotClassify => f.write_str("warning:cannot classify"),
            Feedback::Duplicate => f.write_str("warning:duplicate"),
        }
    }
}

/// Frame-to-decision pipeline shared by all camera connections.
pub struct FramePipeline {
    snapshot: SnapshotStore,
    engine: Arc<Engine>,
    directory: Arc<dyn Directory>,
    recorder: Arc<AttendanceRecorder>,
}

impl FramePipeline {
    pub fn new(
        snapshot: SnapshotStore,
        engine: Arc<Engine>,
        directory: Arc<dyn Directory>,
        recorder: Arc<AttendanceRecorder>,
    ) -> Self {
        Self {
            snapshot,
            engine,
            directory,
            recorder,
        }
    }

    /// Process one frame. `None` means nothing is sent back.
    pub async fn process(&self, frame: Bytes, now: DateTime<Utc>) -> Option<Feedback> {
        self.snapshot.publish(frame.clone());

        let user_id = match self.engine.classify(&frame).await {
            Ok(ClassificationResult::Matched { user_id, confidence }) => {
                tracing::debug!(user_id, confidence, "frame matched");
                user_id
            }
            Ok(ClassificationResult::NoFace) => {
                tracing::debug!("no single face in frame");
                return Some(Feedback::CannotClassify);
            }
            Ok(ClassificationResult::Unmatched) => {
                tracing::debug!("face did not match any reference");
                return Some(Feedback::CannotClassify);
            }
            Err(err) => {
                tracing::warn!(error = %err, "classification failed");
                return Some(Feedback::CannotClassify);
            }
        };

        let user = match self.directory.find_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id, "matched user no longer exists");
                return Some(Feedback::CannotClassify);
            }
            Err(err) => {
                tracing::error!(user_id, error = %err, "user lookup failed");
                return None;
            }
        };

        match self.recorder.record(user.id, now).await {
            Ok(RecordOutcome::Recorded(log)) => Some(Feedback::Success {
                name: user.name,
                kind: log.kind,
            }),
            Ok(RecordOutcome::Duplicate) => Some(Feedback::Duplicate),
            Ok(RecordOutcome::Suppressed) => None,
            Err(err) => {
                tracing::error!(user_id = user.id, error = %err, "failed to record attendance");
                None
            }
        }
    }
}

/// Admits at most one frame per interval, measured from when the previous
/// admitted frame finished processing.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    ready_at: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ready_at: None,
        }
    }

    pub fn admit(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |ready_at| now >= ready_at)
    }

    pub fn finished(&mut self, now: Instant) {
        self.ready_at = Some(now + self.interval);
    }
}

/// `GET /camera-websocket`
pub async fn camera_websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_camera(socket, state))
}

async fn handle_camera(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("camera", %connection_id);
    let (sender, receiver) = socket.split();

    async move {
        tracing::info!("camera connected");
        let processed = run_connection(receiver, sender, &state.pipeline, state.frame_interval).await;
        tracing::info!(processed, "camera disconnected");
    }
    .instrument(span)
    .await;
}

/// Drive one connection until the client closes it or the transport fails.
/// Returns the number of frames processed.
pub async fn run_connection<R, W, E>(
    mut receiver: R,
    mut sender: W,
    pipeline: &FramePipeline,
    frame_interval: Duration,
) -> usize
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    W: Sink<Message> + Unpin,
    E: fmt::Display,
{
    let mut pacer = Pacer::new(frame_interval);
    let mut processed = 0;

    while let Some(message) = receiver.next().await {
        let frame = match message {
            Ok(Message::Binary(data)) if data.is_empty() => continue,
            Ok(Message::Binary(data)) => Bytes::from(data),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "camera receive failed");
                break;
            }
        };

        if !pacer.admit(Instant::now()) {
            tracing::trace!(bytes = frame.len(), "frame dropped by pacer");
            continue;
        }

        let feedback = pipeline.process(frame, Utc::now()).await;
        pacer.finished(Instant::now());
        processed += 1;

        if let Some(feedback) = feedback {
            if sender.send(Message::Text(feedback.to_string())).await.is_err() {
                tracing::debug!("camera send failed");
                break;
            }
        }
    }

    processed
}
