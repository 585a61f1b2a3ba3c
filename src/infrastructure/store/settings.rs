use crate::domain::models::UserSettings;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{parse_instant, SqliteStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub(crate) const SETTINGS_COLUMNS: &str = "timezone, default_task_id, pomodoro_work_minutes, \
     pomodoro_short_break_minutes, pomodoro_long_break_minutes, pomodoro_long_break_every, \
     pomodoro_v2_enabled, auto_archive_enabled, created_at, updated_at";

pub(crate) fn settings_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSettings> {
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(UserSettings {
        timezone: row.get(0)?,
        default_task_id: row.get(1)?,
        pomodoro_work_minutes: row.get(2)?,
        pomodoro_short_break_minutes: row.get(3)?,
        pomodoro_long_break_minutes: row.get(4)?,
        pomodoro_long_break_every: row.get(5)?,
        pomodoro_v2_enabled: row.get(6)?,
        auto_archive_enabled: row.get(7)?,
        created_at: parse_instant(&created_at)?,
        updated_at: parse_instant(&updated_at)?,
    })
}

pub(crate) fn settings_row(
    connection: &Connection,
    owner: &str,
) -> Result<Option<UserSettings>, AppError> {
    let query = format!("SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE owner_id = ?1");
    let settings = connection
        .query_row(&query, params![owner], settings_from_row)
        .optional()?;
    Ok(settings)
}

impl SqliteStore {
    /// Stored settings, or the defaults when the owner has never saved
    /// any. The defaults are not persisted by reading.
    pub fn get_user_settings(
        &self,
        owner: &str,
        now: DateTime<Utc>,
    ) -> Result<UserSettings, AppError> {
        let connection = self.lock()?;
        Ok(settings_row(&connection, owner)?.unwrap_or_else(|| UserSettings::defaults_at(now)))
    }

    /// The persisted settings row, if one exists. Unlike
    /// [`get_user_settings`](Self::get_user_settings) this does not
    /// synthesize defaults.
    pub fn stored_user_settings(&self, owner: &str) -> Result<Option<UserSettings>, AppError> {
        let connection = self.lock()?;
        settings_row(&connection, owner)
    }

    pub fn upsert_user_settings(
        &self,
        owner: &str,
        timezone: &str,
        default_task_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<UserSettings, AppError> {
        if timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(AppError::Validation(format!(
                "unknown timezone '{timezone}'"
            )));
        }

        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        if let Some(task_id) = default_task_id {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM tasks WHERE owner_id = ?1 AND id = ?2",
                    params![owner, task_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("task {task_id}")));
            }
        }

        tx.execute(
            "INSERT INTO user_settings (owner_id, timezone, default_task_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(owner_id) DO UPDATE SET
               timezone = excluded.timezone,
               default_task_id = excluded.default_task_id,
               updated_at = excluded.updated_at",
            params![owner, timezone, default_task_id, now.to_rfc3339()],
        )?;

        let query = format!("SELECT {SETTINGS_COLUMNS} FROM user_settings WHERE owner_id = ?1");
        let settings = tx.query_row(&query, params![owner], settings_from_row)?;
        tx.commit()?;
        Ok(settings)
    }
}
