use chrono::Utc;
use efl_core::{StoreError, User, UserId};
use rusqlite::{params, OptionalExtension, Row};

use crate::{format_datetime, parse_datetime, Database};

struct UserRow {
    id: i64,
    name: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: self.id,
            name: self.name,
            created_at: parse_datetime(&self.created_at, "users.created_at")?,
        })
    }
}

impl Database {
    pub async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let name = name.trim().to_string();
        let created_at = Utc::now();
        let stamp = format_datetime(&created_at);

        let id = self
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
                    params![name, stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        self.find_user(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id} after insert")))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = self
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name, created_at FROM users ORDER BY id ASC")?;
                let rows = stmt
                    .query_map([], UserRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = self
            .call(move |conn| {
                conn.query_row(
                    "SELECT id, name, created_at FROM users WHERE id = ?1",
                    params![id],
                    UserRow::from_row,
                )
                .optional()
            })
            .await?;

        row.map(UserRow::into_user).transpose()
    }
}
