//! Workbook/archive export. Both forms carry the same seven logical
//! tables; the column sets here are the contract the importer
//! validates uploads against, so the two modules share these
//! constants.

use crate::application::{system_clock, NowProvider};
use crate::domain::models::{
    PomodoroEvent, Project, QueueItem, Session, Task, UserSettings,
};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const APP_IDENTIFIER: &str = "focusdeck";
pub const SCHEMA_VERSION: &str = "1";

pub const SHEET_MANIFEST: &str = "Manifest";
pub const SHEET_PROJECTS: &str = "Projects";
pub const SHEET_TASKS: &str = "Tasks";
pub const SHEET_SESSIONS: &str = "Sessions";
pub const SHEET_EVENTS: &str = "PomodoroEvents";
pub const SHEET_QUEUE: &str = "Queue";
pub const SHEET_SETTINGS: &str = "Settings";

/// Sheet order for the workbook form and the sheet-to-file mapping for
/// the archive form.
pub(crate) const SHEET_FILES: &[(&str, &str)] = &[
    (SHEET_MANIFEST, "manifest.csv"),
    (SHEET_PROJECTS, "projects.csv"),
    (SHEET_TASKS, "tasks.csv"),
    (SHEET_SESSIONS, "sessions.csv"),
    (SHEET_EVENTS, "pomodoro_events.csv"),
    (SHEET_QUEUE, "queue.csv"),
    (SHEET_SETTINGS, "settings.csv"),
];

pub(crate) const MANIFEST_HEADER: &[&str] = &["key", "value"];
pub(crate) const PROJECTS_HEADER: &[&str] =
    &["id", "name", "archived_at", "created_at", "updated_at"];
pub(crate) const TASKS_HEADER: &[&str] = &[
    "id",
    "title",
    "completed",
    "project_id",
    "archived_at",
    "created_at",
    "updated_at",
    "pomodoro_work_minutes",
    "pomodoro_short_break_minutes",
    "pomodoro_long_break_minutes",
    "pomodoro_long_break_every",
];
pub(crate) const SESSIONS_HEADER: &[&str] = &[
    "id",
    "task_id",
    "started_at",
    "ended_at",
    "duration_seconds",
    "music_url",
    "pomodoro_phase",
    "pomodoro_phase_started_at",
    "pomodoro_is_paused",
    "pomodoro_paused_at",
    "pomodoro_cycle_count",
];
pub(crate) const EVENTS_HEADER: &[&str] = &[
    "id",
    "session_id",
    "task_id",
    "event_type",
    "pomodoro_cycle_count",
    "occurred_at",
];
pub(crate) const QUEUE_HEADER: &[&str] = &["task_id", "sort_order", "created_at"];
pub(crate) const SETTINGS_HEADER: &[&str] = &[
    "timezone",
    "default_task_id",
    "created_at",
    "updated_at",
    "pomodoro_work_minutes",
    "pomodoro_short_break_minutes",
    "pomodoro_long_break_minutes",
    "pomodoro_long_break_every",
    "pomodoro_v2_enabled",
];

pub(crate) fn header_for(sheet: &str) -> &'static [&'static str] {
    match sheet {
        SHEET_MANIFEST => MANIFEST_HEADER,
        SHEET_PROJECTS => PROJECTS_HEADER,
        SHEET_TASKS => TASKS_HEADER,
        SHEET_SESSIONS => SESSIONS_HEADER,
        SHEET_EVENTS => EVENTS_HEADER,
        SHEET_QUEUE => QUEUE_HEADER,
        SHEET_SETTINGS => SETTINGS_HEADER,
        _ => &[],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub app: String,
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    /// First row is the header.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub files: BTreeMap<String, String>,
}

pub struct ExportService {
    store: Arc<SqliteStore>,
    now_provider: NowProvider,
}

impl ExportService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self::with_now_provider(store, system_clock())
    }

    pub fn with_now_provider(store: Arc<SqliteStore>, now_provider: NowProvider) -> Self {
        Self {
            store,
            now_provider,
        }
    }

    /// One JSON document with the seven sheets inline, in contract
    /// order.
    pub fn export_workbook(&self, owner: &str) -> Result<String, AppError> {
        let workbook = Workbook {
            app: APP_IDENTIFIER.to_string(),
            sheets: self.sheets(owner)?,
        };
        Ok(serde_json::to_string(&workbook)?)
    }

    /// One JSON envelope holding the same sheets as CSV files.
    pub fn export_archive(&self, owner: &str) -> Result<String, AppError> {
        let mut files = BTreeMap::new();
        for sheet in self.sheets(owner)? {
            files.insert(archive_file_name(&sheet.name), rows_to_csv(&sheet.rows)?);
        }
        Ok(serde_json::to_string(&Archive { files })?)
    }

    fn sheets(&self, owner: &str) -> Result<Vec<Sheet>, AppError> {
        let exported_at = (self.now_provider)();
        Ok(vec![
            manifest_sheet(exported_at),
            projects_sheet(&self.store.list_projects(owner)?),
            tasks_sheet(&self.store.list_tasks(owner)?),
            sessions_sheet(&self.store.list_sessions(owner)?),
            events_sheet(&self.store.list_pomodoro_events(owner)?),
            queue_sheet(&self.store.task_queue_list(owner)?),
            settings_sheet(self.store.stored_user_settings(owner)?.as_ref()),
        ])
    }
}

fn archive_file_name(sheet: &str) -> String {
    SHEET_FILES
        .iter()
        .find(|(name, _)| *name == sheet)
        .map(|(_, file)| (*file).to_string())
        .unwrap_or_else(|| format!("{}.csv", sheet.to_lowercase()))
}

fn rows_to_csv(rows: &[Vec<String>]) -> Result<String, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .write_record(row)
            .map_err(|error| AppError::Rpc(format!("csv write: {error}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| AppError::Rpc(format!("csv flush: {error}")))?;
    String::from_utf8(bytes).map_err(|error| AppError::Rpc(format!("csv encoding: {error}")))
}

fn header_row(header: &[&str]) -> Vec<String> {
    header.iter().map(|cell| (*cell).to_string()).collect()
}

fn instant_cell(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn opt_instant_cell(value: Option<DateTime<Utc>>) -> String {
    value.map(instant_cell).unwrap_or_default()
}

fn opt_text_cell(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn opt_int_cell(value: Option<i64>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}

fn bool_cell(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn manifest_sheet(exported_at: DateTime<Utc>) -> Sheet {
    Sheet {
        name: SHEET_MANIFEST.to_string(),
        rows: vec![
            header_row(MANIFEST_HEADER),
            vec!["schema_version".to_string(), SCHEMA_VERSION.to_string()],
            vec!["app".to_string(), APP_IDENTIFIER.to_string()],
            vec!["exported_at".to_string(), instant_cell(exported_at)],
        ],
    }
}

fn projects_sheet(projects: &[Project]) -> Sheet {
    let mut rows = vec![header_row(PROJECTS_HEADER)];
    for project in projects {
        rows.push(vec![
            project.id.clone(),
            project.name.clone(),
            opt_instant_cell(project.archived_at),
            instant_cell(project.created_at),
            instant_cell(project.updated_at),
        ]);
    }
    Sheet {
        name: SHEET_PROJECTS.to_string(),
        rows,
    }
}

fn tasks_sheet(tasks: &[Task]) -> Sheet {
    let mut rows = vec![header_row(TASKS_HEADER)];
    for task in tasks {
        rows.push(vec![
            task.id.clone(),
            task.title.clone(),
            bool_cell(task.completed),
            opt_text_cell(task.project_id.as_deref()),
            opt_instant_cell(task.archived_at),
            instant_cell(task.created_at),
            instant_cell(task.updated_at),
            opt_int_cell(task.pomodoro.work_minutes),
            opt_int_cell(task.pomodoro.short_break_minutes),
            opt_int_cell(task.pomodoro.long_break_minutes),
            opt_int_cell(task.pomodoro.long_break_every),
        ]);
    }
    Sheet {
        name: SHEET_TASKS.to_string(),
        rows,
    }
}

fn sessions_sheet(sessions: &[Session]) -> Sheet {
    let mut rows = vec![header_row(SESSIONS_HEADER)];
    for session in sessions {
        rows.push(vec![
            session.id.clone(),
            opt_text_cell(session.task_id.as_deref()),
            instant_cell(session.started_at),
            opt_instant_cell(session.ended_at),
            opt_int_cell(session.duration_seconds),
            opt_text_cell(session.music_url.as_deref()),
            opt_text_cell(session.pomodoro_phase.map(|phase| phase.as_str())),
            opt_instant_cell(session.pomodoro_phase_started_at),
            bool_cell(session.pomodoro_is_paused),
            opt_instant_cell(session.pomodoro_paused_at),
            session.pomodoro_cycle_count.to_string(),
        ]);
    }
    Sheet {
        name: SHEET_SESSIONS.to_string(),
        rows,
    }
}

fn events_sheet(events: &[PomodoroEvent]) -> Sheet {
    let mut rows = vec![header_row(EVENTS_HEADER)];
    for event in events {
        rows.push(vec![
            event.id.clone(),
            event.session_id.clone(),
            opt_text_cell(event.task_id.as_deref()),
            event.event_type.clone(),
            event.pomodoro_cycle_count.to_string(),
            instant_cell(event.occurred_at),
        ]);
    }
    Sheet {
        name: SHEET_EVENTS.to_string(),
        rows,
    }
}

fn queue_sheet(items: &[QueueItem]) -> Sheet {
    let mut rows = vec![header_row(QUEUE_HEADER)];
    for item in items {
        rows.push(vec![
            item.task_id.clone(),
            item.sort_order.to_string(),
            instant_cell(item.created_at),
        ]);
    }
    Sheet {
        name: SHEET_QUEUE.to_string(),
        rows,
    }
}

/// At most one row. Owners who never saved settings export none, so a
/// later import does not persist synthesized defaults.
fn settings_sheet(settings: Option<&UserSettings>) -> Sheet {
    let mut rows = vec![header_row(SETTINGS_HEADER)];
    if let Some(settings) = settings {
        rows.push(vec![
            settings.timezone.clone(),
            opt_text_cell(settings.default_task_id.as_deref()),
            instant_cell(settings.created_at),
            instant_cell(settings.updated_at),
            settings.pomodoro_work_minutes.to_string(),
            settings.pomodoro_short_break_minutes.to_string(),
            settings.pomodoro_long_break_minutes.to_string(),
            settings.pomodoro_long_break_every.to_string(),
            bool_cell(settings.pomodoro_v2_enabled),
        ]);
    }
    Sheet {
        name: SHEET_SETTINGS.to_string(),
        rows,
    }
}
