use crate::infrastructure::error::AppError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Small key/value store visible to every tab of one deployment. Leader
/// election keeps its claim record here and the cross-tab channel uses it
/// as the fallback transport.
pub trait SharedStateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn put(&self, key: &str, value: &str, updated_at: DateTime<Utc>) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSharedStateStore {
    db_path: PathBuf,
}

impl SqliteSharedStateStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, AppError> {
        Connection::open(&self.db_path).map_err(AppError::from)
    }
}

impl SharedStateStore for SqliteSharedStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let connection = self.connect()?;
        let value: Option<String> = connection
            .query_row(
                "SELECT value FROM shared_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str, updated_at: DateTime<Utc>) -> Result<(), AppError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO shared_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value, updated_at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM shared_state WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySharedStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStateStore for InMemorySharedStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::lock_poisoned("shared state"))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str, _updated_at: DateTime<Utc>) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::lock_poisoned("shared state"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AppError::lock_poisoned("shared state"))?;
        entries.remove(key);
        Ok(())
    }
}
