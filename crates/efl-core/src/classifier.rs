//! Face classification contract.
//!
//! Descriptor extraction is delegated to a [`FaceEncoder`]; nearest-sample
//! matching against the reference set happens here.

use crate::types::{ClassificationResult, Descriptor, ReferenceDescriptor, ReferenceSet, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("image does not contain exactly one face")]
    NoSingleFace,
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    #[error("malformed encoder response: {0}")]
    Malformed(String),
}

/// Derives a descriptor from raw encoded image bytes.
///
/// Implementations return [`ClassifierError::NoSingleFace`] when the image
/// holds zero or several faces.
#[async_trait]
pub trait FaceEncoder: Send + Sync {
    async fn derive_descriptor(&self, image: &[u8]) -> Result<Descriptor, ClassifierError>;
}

/// Result of matching a probe descriptor against a reference set.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best candidate [-1, 1].
    pub similarity: f32,
    pub user_id: Option<UserId>,
    pub face_id: Option<i64>,
}

/// Strategy for comparing a probe descriptor against the references.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, references: &[ReferenceDescriptor], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Always visits every reference; the best score wins.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Descriptor, references: &[ReferenceDescriptor], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, reference) in references.iter().enumerate() {
            let sim = probe.similarity(&reference.descriptor);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                user_id: Some(references[idx].user_id),
                face_id: Some(references[idx].face_id),
            },
            _ => MatchResult {
                matched: false,
                similarity: if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                user_id: None,
                face_id: None,
            },
        }
    }
}

/// Encoder plus matcher with a fixed acceptance threshold.
#[derive(Clone)]
pub struct FaceClassifier {
    encoder: Arc<dyn FaceEncoder>,
    threshold: f32,
}

impl FaceClassifier {
    pub fn new(encoder: Arc<dyn FaceEncoder>, threshold: f32) -> Self {
        Self { encoder, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub async fn derive_descriptor(&self, image: &[u8]) -> Result<Descriptor, ClassifierError> {
        self.encoder.derive_descriptor(image).await
    }

    /// Classify one frame against `references`.
    ///
    /// A frame without exactly one face is `NoFace`, not an error. Encoder
    /// faults are returned as errors.
    pub async fn classify(
        &self,
        image: &[u8],
        references: &ReferenceSet,
    ) -> Result<ClassificationResult, ClassifierError> {
        let probe = match self.encoder.derive_descriptor(image).await {
            Ok(descriptor) => descriptor,
            Err(ClassifierError::NoSingleFace) => return Ok(ClassificationResult::NoFace),
            Err(e) => return Err(e),
        };

        let result = CosineMatcher.compare(&probe, references.as_slice(), self.threshold);
        tracing::debug!(
            matched = result.matched,
            similarity = result.similarity,
            face_id = ?result.face_id,
            references = references.len(),
            "classified frame"
        );

        Ok(match result.user_id {
            Some(user_id) if result.matched => ClassificationResult::Matched {
                user_id,
                confidence: result.similarity,
            },
            _ => ClassificationResult::Unmatched,
        })
    }
}
