//! efl-core — attendance logging by face recognition.
//!
//! Holds the domain model, the face classification contract, the
//! attendance gate and the reference-set loader. Storage and transport
//! live in `efl-store` and `efld`.

pub mod classifier;
pub mod directory;
pub mod gate;
pub mod recorder;
pub mod references;
pub mod types;

pub use classifier::{ClassifierError, CosineMatcher, FaceClassifier, FaceEncoder, Matcher};
pub use directory::{Directory, EventStore, StoreError};
pub use gate::{GateDecision, GatePolicy, PresenceState};
pub use recorder::{AttendanceRecorder, RecordOutcome};
pub use references::{ReferenceCache, ReferenceError, ReferenceLoader};
pub use types::{
    AttendanceLog, AttendanceType, ClassificationResult, Descriptor, EnrolledFace,
    ReferenceDescriptor, ReferenceSet, User, UserId,
};
