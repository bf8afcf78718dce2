//! Live preview as a `multipart/x-mixed-replace` JPEG stream.

use crate::snapshot::SnapshotStore;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::IntoResponse,
};
use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub const BOUNDARY: &str = "frame";

/// One multipart part carrying `frame`.
pub fn encode_part(frame: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    let mut part = BytesMut::with_capacity(header.len() + frame.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(frame);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Emit the current snapshot every `period`, starting immediately.
///
/// Ends as soon as the snapshot is empty.
pub fn preview_stream(
    snapshot: SnapshotStore,
    period: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    futures::stream::unfold((snapshot, ticker), |(snapshot, mut ticker)| async move {
        ticker.tick().await;
        let frame = snapshot.latest()?;
        Some((Ok(encode_part(&frame)), (snapshot, ticker)))
    })
}

/// `GET /preview`
pub async fn preview(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("preview viewer connected");
    let body = Body::from_stream(preview_stream(state.snapshot.clone(), state.preview_interval));
    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
}
