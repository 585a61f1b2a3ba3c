use crate::domain::models::{PomodoroEvent, Project, QueueItem, Session, Task, UserSettings};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{day_opt_text, instant_opt_text, parse_instant, SqliteStore};
use crate::infrastructure::store::queue::write_repacked;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

fn stored_updated_at(
    tx: &Transaction<'_>,
    table: &str,
    owner: &str,
    id: &str,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let query = format!("SELECT updated_at FROM {table} WHERE owner_id = ?1 AND id = ?2");
    let raw: Option<String> = tx
        .query_row(&query, params![owner, id], |row| row.get(0))
        .optional()?;
    raw.map(|value| parse_instant(&value).map_err(AppError::from))
        .transpose()
}

/// Batched import writes. Each method is one chunk, one transaction;
/// the caller sequences chunks and entities. Rows that lose a
/// strictly-newer comparison or collide with an existing id are left
/// untouched without being counted.
impl SqliteStore {
    pub fn import_projects_merge(
        &self,
        owner: &str,
        rows: &[Project],
    ) -> Result<usize, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let mut applied = 0;
        for project in rows {
            match stored_updated_at(&tx, "projects", owner, &project.id)? {
                None => {
                    tx.execute(
                        "INSERT INTO projects (id, owner_id, name, archived_at, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            project.id,
                            owner,
                            project.name,
                            instant_opt_text(project.archived_at),
                            project.created_at.to_rfc3339(),
                            project.updated_at.to_rfc3339(),
                        ],
                    )?;
                    applied += 1;
                }
                Some(existing) if project.updated_at > existing => {
                    tx.execute(
                        "UPDATE projects SET name = ?3, archived_at = ?4, created_at = ?5, updated_at = ?6
                         WHERE owner_id = ?1 AND id = ?2",
                        params![
                            owner,
                            project.id,
                            project.name,
                            instant_opt_text(project.archived_at),
                            project.created_at.to_rfc3339(),
                            project.updated_at.to_rfc3339(),
                        ],
                    )?;
                    applied += 1;
                }
                Some(_) => {}
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    /// The portable task columns only; `scheduled_for` is not part of the
    /// file contract and survives merges untouched.
    pub fn import_tasks_merge(&self, owner: &str, rows: &[Task]) -> Result<usize, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let mut applied = 0;
        for task in rows {
            match stored_updated_at(&tx, "tasks", owner, &task.id)? {
                None => {
                    tx.execute(
                        "INSERT INTO tasks
                           (id, owner_id, title, completed, project_id, archived_at, scheduled_for,
                            pomodoro_work_minutes, pomodoro_short_break_minutes,
                            pomodoro_long_break_minutes, pomodoro_long_break_every,
                            created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                        params![
                            task.id,
                            owner,
                            task.title,
                            task.completed,
                            task.project_id,
                            instant_opt_text(task.archived_at),
                            day_opt_text(task.scheduled_for),
                            task.pomodoro.work_minutes,
                            task.pomodoro.short_break_minutes,
                            task.pomodoro.long_break_minutes,
                            task.pomodoro.long_break_every,
                            task.created_at.to_rfc3339(),
                            task.updated_at.to_rfc3339(),
                        ],
                    )?;
                    applied += 1;
                }
                Some(existing) if task.updated_at > existing => {
                    tx.execute(
                        "UPDATE tasks SET title = ?3, completed = ?4, project_id = ?5,
                           archived_at = ?6, pomodoro_work_minutes = ?7,
                           pomodoro_short_break_minutes = ?8, pomodoro_long_break_minutes = ?9,
                           pomodoro_long_break_every = ?10, created_at = ?11, updated_at = ?12
                         WHERE owner_id = ?1 AND id = ?2",
                        params![
                            owner,
                            task.id,
                            task.title,
                            task.completed,
                            task.project_id,
                            instant_opt_text(task.archived_at),
                            task.pomodoro.work_minutes,
                            task.pomodoro.short_break_minutes,
                            task.pomodoro.long_break_minutes,
                            task.pomodoro.long_break_every,
                            task.created_at.to_rfc3339(),
                            task.updated_at.to_rfc3339(),
                        ],
                    )?;
                    applied += 1;
                }
                Some(_) => {}
            }
        }
        tx.commit()?;
        Ok(applied)
    }

    /// Insert-only; rows whose id already exists are skipped silently.
    /// Callers must only pass ended sessions, which keeps the
    /// one-active-session index out of play.
    pub fn import_sessions_insert(
        &self,
        owner: &str,
        rows: &[Session],
    ) -> Result<usize, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let mut inserted = 0;
        for session in rows {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO sessions
                   (id, owner_id, task_id, started_at, ended_at, duration_seconds, music_url,
                    pomodoro_phase, pomodoro_phase_started_at, pomodoro_is_paused,
                    pomodoro_paused_at, pomodoro_cycle_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    session.id,
                    owner,
                    session.task_id,
                    session.started_at.to_rfc3339(),
                    instant_opt_text(session.ended_at),
                    session.duration_seconds,
                    session.music_url,
                    session.pomodoro_phase.map(|phase| phase.as_str()),
                    instant_opt_text(session.pomodoro_phase_started_at),
                    session.pomodoro_is_paused,
                    instant_opt_text(session.pomodoro_paused_at),
                    session.pomodoro_cycle_count,
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn import_events_insert(
        &self,
        owner: &str,
        rows: &[PomodoroEvent],
    ) -> Result<usize, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let mut inserted = 0;
        for event in rows {
            inserted += tx.execute(
                "INSERT OR IGNORE INTO pomodoro_events
                   (id, owner_id, session_id, task_id, event_type, pomodoro_cycle_count, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.id,
                    owner,
                    event.session_id,
                    event.task_id,
                    event.event_type,
                    event.pomodoro_cycle_count,
                    event.occurred_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Full replacement with dense orders; the queue's identity is the
    /// ordered set itself.
    pub fn import_replace_queue(
        &self,
        owner: &str,
        items: &[QueueItem],
    ) -> Result<usize, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        write_repacked(&tx, owner, items)?;
        tx.commit()?;
        Ok(items.len())
    }

    pub fn import_settings_if_newer(
        &self,
        owner: &str,
        incoming: &UserSettings,
    ) -> Result<bool, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT updated_at FROM user_settings WHERE owner_id = ?1",
                params![owner],
                |row| row.get(0),
            )
            .optional()?;
        let applied = match existing {
            None => {
                tx.execute(
                    "INSERT INTO user_settings
                       (owner_id, timezone, default_task_id, pomodoro_work_minutes,
                        pomodoro_short_break_minutes, pomodoro_long_break_minutes,
                        pomodoro_long_break_every, pomodoro_v2_enabled, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        owner,
                        incoming.timezone,
                        incoming.default_task_id,
                        incoming.pomodoro_work_minutes,
                        incoming.pomodoro_short_break_minutes,
                        incoming.pomodoro_long_break_minutes,
                        incoming.pomodoro_long_break_every,
                        incoming.pomodoro_v2_enabled,
                        incoming.created_at.to_rfc3339(),
                        incoming.updated_at.to_rfc3339(),
                    ],
                )?;
                true
            }
            Some(raw) => {
                let stored = parse_instant(&raw)?;
                if incoming.updated_at > stored {
                    tx.execute(
                        "UPDATE user_settings SET timezone = ?2, default_task_id = ?3,
                           pomodoro_work_minutes = ?4, pomodoro_short_break_minutes = ?5,
                           pomodoro_long_break_minutes = ?6, pomodoro_long_break_every = ?7,
                           pomodoro_v2_enabled = ?8, updated_at = ?9
                         WHERE owner_id = ?1",
                        params![
                            owner,
                            incoming.timezone,
                            incoming.default_task_id,
                            incoming.pomodoro_work_minutes,
                            incoming.pomodoro_short_break_minutes,
                            incoming.pomodoro_long_break_minutes,
                            incoming.pomodoro_long_break_every,
                            incoming.pomodoro_v2_enabled,
                            incoming.updated_at.to_rfc3339(),
                        ],
                    )?;
                    true
                } else {
                    false
                }
            }
        };
        tx.commit()?;
        Ok(applied)
    }
}
