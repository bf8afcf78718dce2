//! HTTP routes.

use crate::state::AppState;
use crate::{ingest, preview};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use efl_core::{ReferenceError, StoreError};
use efl_store::AttendanceEntry;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    References(#[from] ReferenceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let status = match &self {
            ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::References(ReferenceError::Encoder(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::References(ReferenceError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/camera-websocket", get(ingest::camera_websocket))
        .route("/preview", get(preview::preview))
        .route("/api/status", get(status))
        .route("/api/attendance", get(list_attendance))
        .route("/api/references/refresh", post(refresh_references))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub version: String,
    pub references: usize,
    pub enrolled_users: usize,
    pub match_threshold: f32,
    pub snapshot: bool,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (references, enrolled_users) = state.engine.reference_stats().await;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        references,
        enrolled_users,
        match_threshold: state.engine.match_threshold(),
        snapshot: state.snapshot.latest().is_some(),
    })
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn list_attendance(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<AttendanceEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT);
    Ok(Json(state.db.list_attendance_logs(limit).await?))
}

async fn refresh_references(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let references = state.engine.refresh().await?;
    Ok(Json(json!({ "references": references })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::table_classifier;
    use crate::engine::Engine;
    use crate::ingest::FramePipeline;
    use crate::snapshot::SnapshotStore;
    use bytes::Bytes;
    use efl_core::{AttendanceRecorder, AttendanceType, GatePolicy};
    use efl_store::Database;
    use futures::{SinkExt, StreamExt};
    use std::sync::Arc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use std::time::Duration;

    async fn serve(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn state(dir: &tempfile::TempDir) -> AppState {
        let image = dir.path().join("alice.jpg");
        std::fs::write(&image, b"alice-ref").unwrap();

        let db = Database::open_in_memory().await.unwrap();
        let alice = db.create_user("Alice").await.unwrap();
        db.enroll_face(alice.id, &image).await.unwrap();

        let engine = Arc::new(Engine::new(
            Arc::new(db.clone()),
            table_classifier(&[("alice-ref", vec![1.0, 0.0]), ("alice-cam", vec![0.9, 0.2])]),
        ));
        let snapshot = SnapshotStore::new();
        let recorder = Arc::new(AttendanceRecorder::new(Arc::new(db.clone()), GatePolicy::default()));
        let pipeline = Arc::new(FramePipeline::new(
            snapshot.clone(),
            engine.clone(),
            Arc::new(db.clone()),
            recorder,
        ));

        AppState {
            db,
            engine,
            pipeline,
            snapshot,
            frame_interval: Duration::from_millis(100),
            preview_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_status_and_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve(state(&dir).await).await;
        let client = reqwest::Client::new();

        let before: StatusResponse = client
            .get(format!("{base}/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(before.references, 0);
        assert!(!before.snapshot);

        let refreshed: serde_json::Value = client
            .post(format!("{base}/api/references/refresh"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(refreshed["references"], 1);

        let after: StatusResponse = client
            .get(format!("{base}/api/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(after.references, 1);
        assert_eq!(after.enrolled_users, 1);
        assert!((after.match_threshold - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_refresh_reports_encoder_outage() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        state.engine.refresh().await.unwrap();
        std::fs::write(dir.path().join("alice.jpg"), b"fault").unwrap();
        let base = serve(state).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/api/references/refresh"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let status: StatusResponse = reqwest::get(format!("{base}/api/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.references, 1);
    }

    #[tokio::test]
    async fn test_attendance_list_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let alice = state.db.list_users().await.unwrap().remove(0);
        let t0 = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        state
            .db
            .create_attendance_log(alice.id, AttendanceType::Entered, t0)
            .await
            .unwrap();
        state
            .db
            .create_attendance_log(alice.id, AttendanceType::Exited, t0 + chrono::TimeDelta::seconds(60))
            .await
            .unwrap();
        let base = serve(state).await;

        let entries: Vec<serde_json::Value> = reqwest::get(format!("{base}/api/attendance?limit=1"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["type"], "exited");
        assert_eq!(entries[0]["user_name"], "Alice");
    }

    #[tokio::test]
    async fn test_preview_streams_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        state.snapshot.publish(Bytes::from_static(b"jpeg"));
        let base = serve(state).await;

        let mut resp = reqwest::get(format!("{base}/preview")).await.unwrap();
        assert_eq!(
            resp.headers()[reqwest::header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );
        let chunk = resp.chunk().await.unwrap().unwrap();
        assert!(chunk.starts_with(b"--frame\r\n"));
    }

    async fn next_text<S>(socket: &mut S) -> String
    where
        S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            match socket.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return text,
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_camera_websocket_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        state.engine.refresh().await.unwrap();
        let db = state.db.clone();
        let snapshot = state.snapshot.clone();
        let base = serve(state).await;

        let url = format!("{}/camera-websocket", base.replacen("http", "ws", 1));
        let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        socket.send(WsMessage::Binary(b"stranger".to_vec())).await.unwrap();
        assert_eq!(next_text(&mut socket).await, "warning:cannot classify");
        assert_eq!(snapshot.latest().unwrap().as_ref(), b"stranger");

        tokio::time::sleep(Duration::from_millis(150)).await;
        socket.send(WsMessage::Binary(b"alice-cam".to_vec())).await.unwrap();
        assert_eq!(next_text(&mut socket).await, "success:Alice entered");
        assert_eq!(snapshot.latest().unwrap().as_ref(), b"alice-cam");

        let entries = db.list_attendance_logs(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].log.kind, AttendanceType::Entered);

        socket.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_preview_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve(state(&dir).await).await;

        let body = reqwest::get(format!("{base}/preview")).await.unwrap().bytes().await.unwrap();
        assert!(body.is_empty());
    }
}
