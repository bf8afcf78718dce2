use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Primary key of a user row.
pub type UserId = i64;

/// Face descriptor produced by the encoder from a single face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Always processes every dimension; a zero vector yields 0.0.
    pub fn similarity(&self, other: &Descriptor) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// A labelled reference derived from one enrolled face.
#[derive(Debug, Clone)]
pub struct ReferenceDescriptor {
    pub user_id: UserId,
    /// Enrolled face row the descriptor was derived from.
    pub face_id: i64,
    pub descriptor: Descriptor,
}

/// Immutable collection of reference descriptors.
///
/// Built wholesale by the loader and published behind an `Arc`; never
/// mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    references: Vec<ReferenceDescriptor>,
}

impl ReferenceSet {
    pub fn new(references: Vec<ReferenceDescriptor>) -> Self {
        Self { references }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn as_slice(&self) -> &[ReferenceDescriptor] {
        &self.references
    }

    /// Number of distinct users covered by this set.
    pub fn user_count(&self) -> usize {
        let mut ids: Vec<UserId> = self.references.iter().map(|r| r.user_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationResult {
    /// Zero or several faces in the frame.
    NoFace,
    /// A face was found but no reference was close enough.
    Unmatched,
    Matched { user_id: UserId, confidence: f32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub id: i64,
    pub user_id: UserId,
    /// Location of the reference image on disk.
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceType {
    Entered,
    Exited,
}

impl AttendanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceType::Entered => "entered",
            AttendanceType::Exited => "exited",
        }
    }

    /// The type that must follow this one.
    pub fn alternate(&self) -> AttendanceType {
        match self {
            AttendanceType::Entered => AttendanceType::Exited,
            AttendanceType::Exited => AttendanceType::Entered,
        }
    }
}

impl fmt::Display for AttendanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attendance type '{0}'")]
pub struct UnknownAttendanceType(pub String);

impl FromStr for AttendanceType {
    type Err = UnknownAttendanceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entered" => Ok(AttendanceType::Entered),
            "exited" => Ok(AttendanceType::Exited),
            other => Err(UnknownAttendanceType(other.to_string())),
        }
    }
}

/// One append-only attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceLog {
    pub id: i64,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: AttendanceType,
    pub created_at: DateTime<Utc>,
}
