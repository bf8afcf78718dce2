use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest camera frame, shared by the ingestor and preview viewers.
///
/// A frame is published as one `Bytes` value, so readers only ever see a
/// complete frame.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<Option<Bytes>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current frame. Empty frames are ignored.
    pub fn publish(&self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.tx.send_replace(Some(frame));
    }

    /// `None` until the first frame arrives.
    pub fn latest(&self) -> Option<Bytes> {
        self.tx.borrow().clone()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
