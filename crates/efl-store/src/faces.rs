use async_trait::async_trait;
use chrono::Utc;
use efl_core::{Directory, EnrolledFace, StoreError, User, UserId};
use rusqlite::{params, OptionalExtension, Row};
use std::path::{Path, PathBuf};

use crate::{format_datetime, parse_datetime, Database};

struct FaceRow {
    id: i64,
    user_id: i64,
    path: String,
    created_at: String,
}

impl FaceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            path: row.get("path")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_face(self) -> Result<EnrolledFace, StoreError> {
        Ok(EnrolledFace {
            id: self.id,
            user_id: self.user_id,
            path: PathBuf::from(self.path),
            created_at: parse_datetime(&self.created_at, "enrolled_faces.created_at")?,
        })
    }
}

impl Database {
    /// Register a reference image for an existing user.
    ///
    /// The image itself is not copied; the row records where it lives.
    pub async fn enroll_face(&self, user_id: UserId, path: &Path) -> Result<EnrolledFace, StoreError> {
        let stored = path.to_string_lossy().into_owned();
        let stamp = format_datetime(&Utc::now());

        let row = self
            .call(move |conn| {
                let tx = conn.transaction()?;
                let exists = tx
                    .query_row("SELECT 1 FROM users WHERE id = ?1", params![user_id], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(None);
                }

                tx.execute(
                    "INSERT INTO enrolled_faces (user_id, path, created_at) VALUES (?1, ?2, ?3)",
                    params![user_id, stored, stamp],
                )?;
                let id = tx.last_insert_rowid();
                let row = tx.query_row(
                    "SELECT id, user_id, path, created_at FROM enrolled_faces WHERE id = ?1",
                    params![id],
                    FaceRow::from_row,
                )?;
                tx.commit()?;
                Ok(Some(row))
            })
            .await?;

        let face = row
            .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))?
            .into_face()?;
        tracing::info!(user_id, face_id = face.id, path = %face.path.display(), "face enrolled");
        Ok(face)
    }

    pub async fn list_enrolled_faces(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        let rows = self
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, path, created_at FROM enrolled_faces ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map([], FaceRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(FaceRow::into_face).collect()
    }
}

#[async_trait]
impl Directory for Database {
    async fn list_enrolled_faces(&self) -> Result<Vec<EnrolledFace>, StoreError> {
        Database::list_enrolled_faces(self).await
    }

    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Database::find_user(self, id).await
    }
}
