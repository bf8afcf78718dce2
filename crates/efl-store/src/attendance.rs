use async_trait::async_trait;
use chrono::{DateTime, Utc};
use efl_core::{AttendanceLog, AttendanceType, EventStore, StoreError, UserId};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::{format_datetime, parse_datetime, Database};

/// An attendance log joined with the user's display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub log: AttendanceLog,
    pub user_name: String,
}

struct LogRow {
    id: i64,
    user_id: i64,
    kind: String,
    created_at: String,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            kind: row.get("type")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_log(self) -> Result<AttendanceLog, StoreError> {
        let kind = self
            .kind
            .parse::<AttendanceType>()
            .map_err(|err| StoreError::Corrupt {
                column: "attendance_logs.type",
                detail: err.to_string(),
            })?;
        Ok(AttendanceLog {
            id: self.id,
            user_id: self.user_id,
            kind,
            created_at: parse_datetime(&self.created_at, "attendance_logs.created_at")?,
        })
    }
}

impl Database {
    pub async fn last_attendance_log(&self, user_id: UserId) -> Result<Option<AttendanceLog>, StoreError> {
        let row = self
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, user_id, type, created_at FROM attendance_logs
                     WHERE user_id = ?1 ORDER BY id DESC LIMIT 1",
                    params![user_id],
                    LogRow::from_row,
                )
                .optional()
            })
            .await?;

        row.map(LogRow::into_log).transpose()
    }

    pub async fn create_attendance_log(
        &self,
        user_id: UserId,
        kind: AttendanceType,
        at: DateTime<Utc>,
    ) -> Result<AttendanceLog, StoreError> {
        let stamp = format_datetime(&at);
        let id = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance_logs (user_id, type, created_at) VALUES (?1, ?2, ?3)",
                    params![user_id, kind.as_str(), stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        // Stored at microsecond precision.
        Ok(AttendanceLog {
            id,
            user_id,
            kind,
            created_at: parse_datetime(&format_datetime(&at), "attendance_logs.created_at")?,
        })
    }

    /// Most recent logs first, at most `limit` of them.
    pub async fn list_attendance_logs(&self, limit: usize) -> Result<Vec<AttendanceEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT l.id AS id, l.user_id AS user_id, l.type AS type,
                            l.created_at AS created_at, u.name AS name
                     FROM attendance_logs l JOIN users u ON u.id = l.user_id
                     ORDER BY l.id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |row| {
                        Ok((LogRow::from_row(row)?, row.get::<_, String>("name")?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(row, user_name)| {
                Ok(AttendanceEntry {
                    log: row.into_log()?,
                    user_name,
                })
            })
            .collect()
    }
}

#[async_trait]
impl EventStore for Database {
    async fn last_attendance_log(&self, user_id: UserId) -> Result<Option<AttendanceLog>, StoreError> {
        Database::last_attendance_log(self, user_id).await
    }

    async fn create_attendance_log(
        &self,
        user_id: UserId,
        kind: AttendanceType,
        at: DateTime<Utc>,
    ) -> Result<AttendanceLog, StoreError> {
        Database::create_attendance_log(self, user_id, kind, at).await
    }
}
