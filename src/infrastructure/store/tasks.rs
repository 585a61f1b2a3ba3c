use crate::domain::models::{PomodoroOverrides, Project, Task};
use crate::infrastructure::change_feed::{ChangeOp, ChangeTable};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{
    day_opt_text, instant_opt_text, parse_day_opt, parse_instant, parse_instant_opt, SqliteStore,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

pub(crate) const TASK_COLUMNS: &str = "id, title, completed, project_id, archived_at, scheduled_for, \
     pomodoro_work_minutes, pomodoro_short_break_minutes, pomodoro_long_break_minutes, \
     pomodoro_long_break_every, created_at, updated_at";

pub(crate) fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        archived_at: parse_instant_opt(row.get(2)?)?,
        created_at: parse_instant(&created_at)?,
        updated_at: parse_instant(&updated_at)?,
    })
}

pub(crate) fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: row.get(2)?,
        project_id: row.get(3)?,
        archived_at: parse_instant_opt(row.get(4)?)?,
        scheduled_for: parse_day_opt(row.get(5)?)?,
        pomodoro: PomodoroOverrides {
            work_minutes: row.get(6)?,
            short_break_minutes: row.get(7)?,
            long_break_minutes: row.get(8)?,
            long_break_every: row.get(9)?,
        },
        created_at: parse_instant(&created_at)?,
        updated_at: parse_instant(&updated_at)?,
    })
}

impl SqliteStore {
    pub fn list_projects(&self, owner: &str) -> Result<Vec<Project>, AppError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "SELECT id, name, archived_at, created_at, updated_at
             FROM projects WHERE owner_id = ?1 ORDER BY created_at, id",
        )?;
        let projects = statement
            .query_map(params![owner], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    pub fn list_tasks(&self, owner: &str) -> Result<Vec<Task>, AppError> {
        let connection = self.lock()?;
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 ORDER BY created_at, id"
        );
        let mut statement = connection.prepare(&query)?;
        let tasks = statement
            .query_map(params![owner], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn get_project(&self, owner: &str, project_id: &str) -> Result<Option<Project>, AppError> {
        let connection = self.lock()?;
        let project = connection
            .query_row(
                "SELECT id, name, archived_at, created_at, updated_at
                 FROM projects WHERE owner_id = ?1 AND id = ?2",
                params![owner, project_id],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn get_task(&self, owner: &str, task_id: &str) -> Result<Option<Task>, AppError> {
        let connection = self.lock()?;
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE owner_id = ?1 AND id = ?2");
        let task = connection
            .query_row(&query, params![owner, task_id], task_from_row)
            .optional()?;
        Ok(task)
    }

    pub fn create_project(&self, owner: &str, project: &Project) -> Result<(), AppError> {
        let connection = self.lock()?;
        connection.execute(
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
        Ok(())
    }

    pub fn create_task(&self, owner: &str, task: &Task) -> Result<(), AppError> {
        {
            let connection = self.lock()?;
            connection.execute(
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
        }
        self.publish(
            ChangeTable::Tasks,
            ChangeOp::Insert,
            owner,
            Some(&task.id),
            None,
            task.updated_at,
        );
        Ok(())
    }

    /// Overwrite the fields the sync engine reconciles, stamping a fresh
    /// updated_at.
    pub fn apply_project_fields(
        &self,
        owner: &str,
        project_id: &str,
        name: &str,
        archived_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let connection = self.lock()?;
        let updated = connection.execute(
            "UPDATE projects SET name = ?3, archived_at = ?4, updated_at = ?5
             WHERE owner_id = ?1 AND id = ?2",
            params![
                owner,
                project_id,
                name,
                instant_opt_text(archived_at),
                now.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("project {project_id}")));
        }
        Ok(())
    }

    pub fn apply_task_fields(
        &self,
        owner: &str,
        task_id: &str,
        title: &str,
        completed: bool,
        project_id: Option<&str>,
        archived_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let updated = {
            let connection = self.lock()?;
            connection.execute(
                "UPDATE tasks SET title = ?3, completed = ?4, project_id = ?5,
                   archived_at = ?6, updated_at = ?7
                 WHERE owner_id = ?1 AND id = ?2",
                params![
                    owner,
                    task_id,
                    title,
                    completed,
                    project_id,
                    instant_opt_text(archived_at),
                    now.to_rfc3339(),
                ],
            )?
        };
        if updated == 0 {
            return Err(AppError::NotFound(format!("task {task_id}")));
        }
        self.publish(
            ChangeTable::Tasks,
            ChangeOp::Update,
            owner,
            Some(task_id),
            Some(task_id),
            now,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_project(id: &str, name: &str) -> Project {
        Project {
            id: id.to_string(),
            name: name.to_string(),
            archived_at: None,
            created_at: fixed_time("2026-02-16T08:00:00Z"),
            updated_at: fixed_time("2026-02-16T08:00:00Z"),
        }
    }

    fn sample_task(id: &str, title: &str) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            completed: false,
            project_id: None,
            archived_at: None,
            scheduled_for: None,
            pomodoro: PomodoroOverrides::default(),
            created_at: fixed_time("2026-02-16T08:00:00Z"),
            updated_at: fixed_time("2026-02-16T08:00:00Z"),
        }
    }

    #[test]
    fn rows_round_trip_through_the_store() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let project = sample_project("p-1", "Writing");
        store.create_project("owner-1", &project).expect("project");

        let mut task = sample_task("t-1", "Draft chapter");
        task.project_id = Some("p-1".to_string());
        task.pomodoro.work_minutes = Some(50);
        store.create_task("owner-1", &task).expect("task");

        assert_eq!(store.list_projects("owner-1").expect("projects"), vec![project]);
        assert_eq!(store.list_tasks("owner-1").expect("tasks"), vec![task]);
        assert!(store.get_task("owner-1", "t-1").expect("get").is_some());
        assert!(store.get_task("owner-2", "t-1").expect("get").is_none());
    }

    #[test]
    fn apply_fields_updates_and_stamps() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store
            .create_project("owner-1", &sample_project("p-1", "Old name"))
            .expect("project");
        store
            .apply_project_fields(
                "owner-1",
                "p-1",
                "New name",
                Some(fixed_time("2026-02-16T10:00:00Z")),
                fixed_time("2026-02-16T10:00:00Z"),
            )
            .expect("apply");

        let projects = store.list_projects("owner-1").expect("projects");
        assert_eq!(projects[0].name, "New name");
        assert!(projects[0].archived_at.is_some());
        assert_eq!(projects[0].updated_at, fixed_time("2026-02-16T10:00:00Z"));

        let missing = store.apply_project_fields(
            "owner-1",
            "p-2",
            "Nope",
            None,
            fixed_time("2026-02-16T10:00:00Z"),
        );
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }
}
