//! Append-only record of update attempts.
//!
//! History lives in the `update_history` table of the user database. The
//! store never creates that database during an append: if it is missing
//! (for example because a rollback failed and the tree is incomplete) the
//! append fails and the caller logs it.

use crate::error::{Result, UpdateError};
use crate::update::pending::PendingUpdateMarker;
use rusqlite::{Connection, OpenFlags, params};
use std::path::{Path, PathBuf};

/// Install method recorded for engine-driven updates.
pub const INSTALL_METHOD_AUTO: &str = "auto";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS update_history (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    version           TEXT NOT NULL,
    previous_version  TEXT NOT NULL,
    channel           TEXT NOT NULL,
    install_method    TEXT NOT NULL,
    download_size     INTEGER NOT NULL DEFAULT 0,
    download_duration REAL NOT NULL DEFAULT 0,
    install_success   INTEGER NOT NULL,
    error_message     TEXT,
    rollback_occurred INTEGER NOT NULL DEFAULT 0,
    timestamp         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_update_history_timestamp ON update_history(timestamp);
"#;

/// One update attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateHistoryRecord {
    pub version: String,
    pub previous_version: String,
    pub channel: String,
    pub install_method: String,
    pub download_size: u64,
    /// Seconds.
    pub download_duration: f64,
    pub install_success: bool,
    pub error_message: Option<String>,
    pub rollback_occurred: bool,
    /// RFC 3339.
    pub timestamp: String,
}

impl UpdateHistoryRecord {
    /// Record for a committed install.
    pub fn success(marker: &PendingUpdateMarker, previous_version: &str) -> Self {
        Self::from_marker(marker, previous_version, true, None, false)
    }

    /// Record for a failed install.
    pub fn failure(
        marker: &PendingUpdateMarker,
        previous_version: &str,
        error: &str,
        rollback_occurred: bool,
    ) -> Self {
        Self::from_marker(
            marker,
            previous_version,
            false,
            Some(error.to_owned()),
            rollback_occurred,
        )
    }

    fn from_marker(
        marker: &PendingUpdateMarker,
        previous_version: &str,
        install_success: bool,
        error_message: Option<String>,
        rollback_occurred: bool,
    ) -> Self {
        Self {
            version: marker.version.clone(),
            previous_version: previous_version.to_owned(),
            channel: marker.channel.to_string(),
            install_method: INSTALL_METHOD_AUTO.to_owned(),
            download_size: marker.size_bytes,
            download_duration: marker.download_duration_secs,
            install_success,
            error_message,
            rollback_occurred,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Destination for history records.
pub trait HistoryStore: Send + Sync {
    /// Append one record. Never updates or deletes existing rows.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::History`] if the record cannot be stored.
    fn append(&self, record: &UpdateHistoryRecord) -> Result<()>;

    /// Most recent records first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::History`] if the store cannot be read.
    fn list(&self, limit: usize) -> Result<Vec<UpdateHistoryRecord>>;
}

/// [`HistoryStore`] backed by the user's SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    path: PathBuf,
}

impl SqliteHistoryStore {
    /// Store over an existing (or future) database file. Nothing is opened
    /// until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the database file if needed and ensure the table exists.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::History`] if the database cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(path);
        if let Some(parent) = store.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&store.path).map_err(history_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(history_err)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_existing(&self) -> Result<Connection> {
        if !self.path.is_file() {
            return Err(UpdateError::History(format!(
                "database not found: {}",
                self.path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(history_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(history_err)?;
        Ok(conn)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn append(&self, record: &UpdateHistoryRecord) -> Result<()> {
        let mut conn = self.open_existing()?;
        let tx = conn.transaction().map_err(history_err)?;
        tx.execute(
            "INSERT INTO update_history (version, previous_version, channel, install_method, \
             download_size, download_duration, install_success, error_message, \
             rollback_occurred, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.version,
                record.previous_version,
                record.channel,
                record.install_method,
                record.download_size as i64,
                record.download_duration,
                record.install_success,
                record.error_message,
                record.rollback_occurred,
                record.timestamp,
            ],
        )
        .map_err(history_err)?;
        tx.commit().map_err(history_err)?;
        tracing::debug!(
            version = %record.version,
            success = record.install_success,
            "update history recorded"
        );
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<UpdateHistoryRecord>> {
        let conn = self.open_existing()?;
        let mut stmt = conn
            .prepare(
                "SELECT version, previous_version, channel, install_method, download_size, \
                 download_duration, install_success, error_message, rollback_occurred, timestamp \
                 FROM update_history ORDER BY id DESC LIMIT ?1",
            )
            .map_err(history_err)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(UpdateHistoryRecord {
                    version: row.get(0)?,
                    previous_version: row.get(1)?,
                    channel: row.get(2)?,
                    install_method: row.get(3)?,
                    download_size: row.get::<_, i64>(4)?.max(0) as u64,
                    download_duration: row.get(5)?,
                    install_success: row.get(6)?,
                    error_message: row.get(7)?,
                    rollback_occurred: row.get(8)?,
                    timestamp: row.get(9)?,
                })
            })
            .map_err(history_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(history_err)
    }
}

fn history_err(e: rusqlite::Error) -> UpdateError {
    UpdateError::History(e.to_string())
}

/// In-memory store for unit tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryHistoryStore {
    records: std::sync::Mutex<Vec<UpdateHistoryRecord>>,
}

#[cfg(test)]
impl HistoryStore for MemoryHistoryStore {
    fn append(&self, record: &UpdateHistoryRecord) -> Result<()> {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.push(record.clone());
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<UpdateHistoryRecord>> {
        let guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}
