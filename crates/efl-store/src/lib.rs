//! efl-store — SQLite-backed directory and attendance event store.
//!
//! All statements run on the single `tokio-rusqlite` connection thread, so
//! each `call` executes atomically with respect to every other call.

mod attendance;
mod faces;
mod migrations;
mod users;

pub use attendance::AttendanceEntry;
pub use migrations::MigrationError;

use chrono::{DateTime, SecondsFormat, Utc};
use efl_core::StoreError;
use std::path::{Path, PathBuf};

/// Handle to the efl database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::database)?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(StoreError::database)?;
        tracing::info!(path = %path.display(), "database opened");

        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(StoreError::database)?;
        let db = Self { conn };
        db.init().await?;
        Ok(db)
    }

    async fn init(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    tracing::warn!(error = %err, "failed to enable WAL mode");
                }
                conn.pragma_update(None, "foreign_keys", "ON")?;
                migrations::run_migrations(conn)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
            })
            .await
            .map_err(StoreError::database)
    }

    /// Run `task` on the connection thread.
    pub(crate) async fn call<F, T>(&self, task: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn| Ok(task(conn)?))
            .await
            .map_err(StoreError::database)
    }
}

/// `$XDG_DATA_HOME/efl/efl.db`, falling back to `~/.local/share`.
pub fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("efl")
        .join("efl.db")
}

pub(crate) fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(value: &str, column: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt {
            column,
            detail: format!("'{value}': {err}"),
        })
}
