//! Storage seams consumed by the core.

use crate::types::{AttendanceLog, AttendanceType, EnrolledFace, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("corrupt {column} value: {detail}")]
    Corrupt { column: &'static str, detail: String },
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn database(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Database(Box::new(err))
    }
}

/// Read access to users and their enrolled faces.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn list_enrolled_faces(&self) -> Result<Vec<EnrolledFace>, StoreError>;

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}

/// Append-only attendance history.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Most recently created log for `user_id`, if any.
    async fn last_attendance_log(&self, user_id: UserId) -> Result<Option<AttendanceLog>, StoreError>;

    async fn create_attendance_log(
        &self,
        user_id: UserId,
        kind: AttendanceType,
        at: DateTime<Utc>,
    ) -> Result<AttendanceLog, StoreError>;
}
