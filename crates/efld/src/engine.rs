use efl_core::{
    ClassificationResult, ClassifierError, Directory, FaceClassifier, ReferenceCache, ReferenceError,
    ReferenceLoader,
};
use std::sync::Arc;

/// Classification service: the classifier plus its published reference set.
///
/// Constructed once at startup and shared by every camera connection and
/// the refresh endpoint.
pub struct Engine {
    classifier: FaceClassifier,
    cache: ReferenceCache,
    loader: ReferenceLoader,
}

impl Engine {
    pub fn new(directory: Arc<dyn Directory>, classifier: FaceClassifier) -> Self {
        Self {
            loader: ReferenceLoader::new(directory, classifier.clone()),
            classifier,
            cache: ReferenceCache::new(),
        }
    }

    /// Classify `frame` against the set published at call time.
    pub async fn classify(&self, frame: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        let references = self.cache.current().await;
        self.classifier.classify(frame, &references).await
    }

    /// Rebuild the reference set from the directory. Returns its size.
    ///
    /// On failure the previously published set stays in place.
    pub async fn refresh(&self) -> Result<usize, ReferenceError> {
        let count = self.loader.reload(&self.cache).await?;
        tracing::info!(references = count, "reference set published");
        Ok(count)
    }

    pub fn match_threshold(&self) -> f32 {
        self.classifier.threshold()
    }

    /// (descriptor count, distinct users) of the published set.
    pub async fn reference_stats(&self) -> (usize, usize) {
        let references = self.cache.current().await;
        (references.len(), references.user_count())
    }
}
