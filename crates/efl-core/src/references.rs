//! Reference set loading and publication.

use crate::classifier::{ClassifierError, FaceClassifier};
use crate::directory::{Directory, StoreError};
use crate::types::{ReferenceDescriptor, ReferenceSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("encoder failed while building references: {0}")]
    Encoder(#[from] ClassifierError),
}

/// Holds the currently published reference set.
///
/// Readers get an `Arc` snapshot that stays valid for the whole
/// classification even if a reload swaps in a new set meanwhile.
pub struct ReferenceCache {
    current: RwLock<Arc<ReferenceSet>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ReferenceSet::empty())),
        }
    }

    pub async fn current(&self) -> Arc<ReferenceSet> {
        self.current.read().await.clone()
    }

    /// Publish `set`, returning the one it replaced.
    pub async fn replace(&self, set: ReferenceSet) -> Arc<ReferenceSet> {
        let mut current = self.current.write().await;
        std::mem::replace(&mut *current, Arc::new(set))
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives one descriptor per enrolled face.
pub struct ReferenceLoader {
    directory: Arc<dyn Directory>,
    classifier: FaceClassifier,
    /// Serializes rebuilds.
    rebuild: Mutex<()>,
}

impl ReferenceLoader {
    pub fn new(directory: Arc<dyn Directory>, classifier: FaceClassifier) -> Self {
        Self {
            directory,
            classifier,
            rebuild: Mutex::new(()),
        }
    }

    /// Build a fresh set from the directory.
    ///
    /// Faces whose image cannot be read or does not hold exactly one face
    /// are skipped with a warning. Directory and encoder faults abort the
    /// build.
    pub async fn build(&self) -> Result<ReferenceSet, ReferenceError> {
        let faces = self.directory.list_enrolled_faces().await?;
        let mut references = Vec::with_capacity(faces.len());

        for face in &faces {
            let image = match tokio::fs::read(&face.path).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(
                        face_id = face.id,
                        user_id = face.user_id,
                        path = %face.path.display(),
                        error = %err,
                        "skipping enrolled face: image unreadable"
                    );
                    continue;
                }
            };

            match self.classifier.derive_descriptor(&image).await {
                Ok(descriptor) => references.push(ReferenceDescriptor {
                    user_id: face.user_id,
                    face_id: face.id,
                    descriptor,
                }),
                Err(ClassifierError::NoSingleFace) => {
                    tracing::warn!(
                        face_id = face.id,
                        user_id = face.user_id,
                        path = %face.path.display(),
                        "skipping enrolled face: not exactly one face"
                    );
                }
                Err(err) => {
                    tracing::error!(face_id = face.id, error = %err, "reference build aborted");
                    return Err(err.into());
                }
            }
        }

        tracing::info!(
            enrolled = faces.len(),
            loaded = references.len(),
            "reference set built"
        );

        Ok(ReferenceSet::new(references))
    }

    /// Rebuild and publish into `cache`. Returns the new set size.
    ///
    /// On error the previously published set stays in place.
    pub async fn reload(&self, cache: &ReferenceCache) -> Result<usize, ReferenceError> {
        let _guard = self.rebuild.lock().await;
        let set = self.build().await?;
        let len = set.len();
        cache.replace(set).await;
        Ok(len)
    }
}
