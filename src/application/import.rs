//! Upload reconciliation. Structural problems (wrong sheets, wrong
//! headers, bad manifest) abort before any row is written; after that,
//! bad rows are skipped and counted, never fatal. Entities land in a
//! fixed order so in-file references resolve: projects, tasks,
//! sessions, events, queue, settings. There is no cross-entity
//! transaction, so a storage failure leaves earlier steps committed.

use crate::application::export::{
    header_for, Archive, Sheet, Workbook, APP_IDENTIFIER, SCHEMA_VERSION, SHEET_EVENTS,
    SHEET_FILES, SHEET_MANIFEST, SHEET_PROJECTS, SHEET_QUEUE, SHEET_SESSIONS, SHEET_SETTINGS,
    SHEET_TASKS,
};
use crate::domain::models::{
    normalize_project_name, normalize_task_title, PomodoroEvent, PomodoroOverrides, PomodoroPhase,
    Project, QueueItem, Session, Task, UserSettings, QUEUE_CAPACITY,
};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Rows per store call, bounding the time any one transaction holds
/// the connection.
pub const IMPORT_CHUNK_ROWS: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Merge,
}

impl ImportMode {
    pub fn parse(raw: &str) -> Result<ImportMode, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(ImportMode::Merge),
            other => Err(AppError::Validation(format!(
                "unsupported import mode '{other}'"
            ))),
        }
    }
}

/// Per-entity counters. A struct rather than a map so every response
/// carries all six keys.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EntityCounts {
    pub projects: usize,
    pub tasks: usize,
    pub sessions: usize,
    pub pomodoro_events: usize,
    pub queue: usize,
    pub settings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub success: bool,
    pub imported: EntityCounts,
    pub skipped: EntityCounts,
    pub warnings: Vec<String>,
}

pub struct ImportService {
    store: Arc<SqliteStore>,
}

impl ImportService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub fn import(
        &self,
        owner: &str,
        raw: &[u8],
        mode: ImportMode,
    ) -> Result<ImportSummary, AppError> {
        match mode {
            ImportMode::Merge => self.merge(owner, raw),
        }
    }

    fn merge(&self, owner: &str, raw: &[u8]) -> Result<ImportSummary, AppError> {
        let sheets = parse_upload(raw)?;
        let mut warnings = Vec::new();
        let mut imported = EntityCounts::default();
        let mut skipped = EntityCounts::default();

        let (projects, dropped) = normalize_projects(&sheets.projects);
        skipped.projects = dropped;
        note_skipped(&mut warnings, "projects", dropped);
        for chunk in projects.chunks(IMPORT_CHUNK_ROWS) {
            imported.projects +=
                at_step("projects", self.store.import_projects_merge(owner, chunk))?;
        }

        let (tasks, dropped, cleared) = normalize_tasks(&sheets.tasks);
        skipped.tasks = dropped;
        note_skipped(&mut warnings, "tasks", dropped);
        note_cleared(&mut warnings, "tasks", "project_id", cleared);
        for chunk in tasks.chunks(IMPORT_CHUNK_ROWS) {
            imported.tasks += at_step("tasks", self.store.import_tasks_merge(owner, chunk))?;
        }

        let (sessions, dropped, cleared, synthesized) = normalize_sessions(&sheets.sessions);
        skipped.sessions = dropped;
        note_skipped(&mut warnings, "sessions", dropped);
        note_cleared(&mut warnings, "sessions", "task_id", cleared);
        if synthesized > 0 {
            warnings.push(format!(
                "sessions: synthesized ended_at from duration_seconds on {synthesized} rows"
            ));
        }
        for chunk in sessions.chunks(IMPORT_CHUNK_ROWS) {
            imported.sessions +=
                at_step("sessions", self.store.import_sessions_insert(owner, chunk))?;
        }

        let (events, dropped, cleared) = normalize_events(&sheets.events);
        skipped.pomodoro_events = dropped;
        note_skipped(&mut warnings, "pomodoro_events", dropped);
        note_cleared(&mut warnings, "pomodoro_events", "task_id", cleared);
        for chunk in events.chunks(IMPORT_CHUNK_ROWS) {
            imported.pomodoro_events +=
                at_step("pomodoro_events", self.store.import_events_insert(owner, chunk))?;
        }

        let known_tasks: HashSet<String> = at_step("queue", self.store.list_tasks(owner))?
            .into_iter()
            .map(|task| task.id)
            .collect();

        let (mut queue_rows, dropped) = normalize_queue(&sheets.queue);
        skipped.queue = dropped;
        note_skipped(&mut warnings, "queue", dropped);
        let before = queue_rows.len();
        queue_rows.retain(|item| known_tasks.contains(&item.task_id));
        let unknown = before - queue_rows.len();
        if unknown > 0 {
            skipped.queue += unknown;
            warnings.push(format!(
                "queue: dropped {unknown} rows referencing unknown tasks"
            ));
        }
        queue_rows.sort_by_key(|item| (item.sort_order, item.created_at));
        if queue_rows.len() > QUEUE_CAPACITY {
            skipped.queue += queue_rows.len() - QUEUE_CAPACITY;
            queue_rows.truncate(QUEUE_CAPACITY);
            warnings.push(format!("queue: truncated to the first {QUEUE_CAPACITY} items"));
        }
        imported.queue = at_step("queue", self.store.import_replace_queue(owner, &queue_rows))?;

        let (candidate, dropped, extra, cleared) = normalize_settings(&sheets.settings);
        skipped.settings = dropped + extra;
        note_skipped(&mut warnings, "settings", dropped);
        if extra > 0 {
            warnings.push(format!("settings: ignored {extra} extra rows"));
        }
        if cleared {
            warnings.push("settings: cleared malformed default_task_id".to_string());
        }
        if let Some(mut settings) = candidate {
            if let Some(task_id) = settings.default_task_id.clone() {
                if !known_tasks.contains(&task_id) {
                    settings.default_task_id = None;
                    warnings.push(
                        "settings: cleared default_task_id referencing an unknown task"
                            .to_string(),
                    );
                }
            }
            if at_step(
                "settings",
                self.store.import_settings_if_newer(owner, &settings),
            )? {
                imported.settings = 1;
            }
        }

        tracing::info!(
            projects = imported.projects,
            tasks = imported.tasks,
            sessions = imported.sessions,
            pomodoro_events = imported.pomodoro_events,
            queue = imported.queue,
            settings = imported.settings,
            warnings = warnings.len(),
            "import finished"
        );
        Ok(ImportSummary {
            success: true,
            imported,
            skipped,
            warnings,
        })
    }
}

fn at_step<T>(step: &str, result: Result<T, AppError>) -> Result<T, AppError> {
    result.map_err(|error| AppError::Rpc(format!("import aborted at the {step} step: {error}")))
}

fn note_skipped(warnings: &mut Vec<String>, entity: &str, count: usize) {
    if count > 0 {
        warnings.push(format!(
            "{entity}: skipped {count} rows with missing or malformed required fields"
        ));
    }
}

fn note_cleared(warnings: &mut Vec<String>, entity: &str, field: &str, count: usize) {
    if count > 0 {
        warnings.push(format!("{entity}: cleared malformed {field} on {count} rows"));
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UploadDocument {
    Workbook(Workbook),
    Archive(Archive),
}

struct UploadSheets {
    projects: Vec<Vec<String>>,
    tasks: Vec<Vec<String>>,
    sessions: Vec<Vec<String>>,
    events: Vec<Vec<String>>,
    queue: Vec<Vec<String>>,
    settings: Vec<Vec<String>>,
}

fn parse_upload(raw: &[u8]) -> Result<UploadSheets, AppError> {
    let document: UploadDocument = serde_json::from_slice(raw).map_err(|_| {
        AppError::Validation(
            "upload is neither a focusdeck workbook nor a focusdeck archive".to_string(),
        )
    })?;
    let sheets = match document {
        UploadDocument::Workbook(workbook) => {
            if workbook.app != APP_IDENTIFIER {
                return Err(AppError::Validation(format!(
                    "workbook app tag '{}' is not '{APP_IDENTIFIER}'",
                    workbook.app
                )));
            }
            workbook.sheets
        }
        UploadDocument::Archive(archive) => archive_sheets(&archive)?,
    };
    collect_sheets(sheets)
}

fn archive_sheets(archive: &Archive) -> Result<Vec<Sheet>, AppError> {
    let mut sheets = Vec::with_capacity(SHEET_FILES.len());
    for (name, file) in SHEET_FILES {
        let content = archive
            .files
            .get(*file)
            .ok_or_else(|| AppError::Validation(format!("archive is missing {file}")))?;
        sheets.push(csv_sheet(name, file, content)?);
    }
    Ok(sheets)
}

fn csv_sheet(name: &str, file: &str, content: &str) -> Result<Sheet, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|error| {
            AppError::Validation(format!("archive file {file} is not valid csv: {error}"))
        })?;
        rows.push(record.iter().map(ToOwned::to_owned).collect());
    }
    Ok(Sheet {
        name: name.to_string(),
        rows,
    })
}

fn collect_sheets(sheets: Vec<Sheet>) -> Result<UploadSheets, AppError> {
    let mut by_name: HashMap<String, Vec<Vec<String>>> = HashMap::new();
    for sheet in sheets {
        if header_for(&sheet.name).is_empty() {
            return Err(AppError::Validation(format!(
                "unexpected sheet '{}'",
                sheet.name
            )));
        }
        if by_name.insert(sheet.name.clone(), sheet.rows).is_some() {
            return Err(AppError::Validation(format!(
                "duplicate sheet '{}'",
                sheet.name
            )));
        }
    }

    let mut take = |name: &str| -> Result<Vec<Vec<String>>, AppError> {
        let rows = by_name
            .remove(name)
            .ok_or_else(|| AppError::Validation(format!("missing sheet '{name}'")))?;
        let expected = header_for(name);
        let actual = rows.first().cloned().unwrap_or_default();
        let matches = actual.len() == expected.len()
            && actual.iter().zip(expected).all(|(have, want)| have == want);
        if !matches {
            return Err(AppError::Validation(format!(
                "sheet '{name}': expected header [{}], found [{}]",
                expected.join(", "),
                actual.join(", ")
            )));
        }
        Ok(rows.into_iter().skip(1).collect())
    };

    let manifest = take(SHEET_MANIFEST)?;
    let projects = take(SHEET_PROJECTS)?;
    let tasks = take(SHEET_TASKS)?;
    let sessions = take(SHEET_SESSIONS)?;
    let events = take(SHEET_EVENTS)?;
    let queue = take(SHEET_QUEUE)?;
    let settings = take(SHEET_SETTINGS)?;

    validate_manifest(&manifest)?;
    Ok(UploadSheets {
        projects,
        tasks,
        sessions,
        events,
        queue,
        settings,
    })
}

fn validate_manifest(rows: &[Vec<String>]) -> Result<(), AppError> {
    let mut values: HashMap<&str, &str> = HashMap::new();
    for row in rows {
        if row.len() >= 2 {
            values.insert(row[0].trim(), row[1].trim());
        }
    }
    let version = values.get("schema_version").copied().unwrap_or_default();
    if version != SCHEMA_VERSION {
        return Err(AppError::Validation(format!(
            "manifest schema_version '{version}' does not match '{SCHEMA_VERSION}'"
        )));
    }
    let app = values.get("app").copied().unwrap_or_default();
    if app != APP_IDENTIFIER {
        return Err(AppError::Validation(format!(
            "manifest app tag '{app}' does not match '{APP_IDENTIFIER}'"
        )));
    }
    Ok(())
}

fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(String::as_str).unwrap_or_default()
}

fn uuid_field(raw: &str) -> Option<String> {
    Uuid::parse_str(raw.trim()).ok().map(|id| id.to_string())
}

fn instant_field(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn text_field(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn bool_field(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn int_field(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(number) = trimmed.parse::<i64>() {
        return Some(number);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.trunc() as i64)
}

fn override_field(raw: &str) -> Option<i64> {
    int_field(raw).filter(|minutes| *minutes > 0)
}

/// Optional reference cell: blank is a plain None, anything non-blank
/// that is not id-shaped is nulled and counted.
fn reference_field(raw: &str, cleared: &mut usize) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = uuid_field(trimmed);
    if parsed.is_none() {
        *cleared += 1;
    }
    parsed
}

fn normalize_projects(rows: &[Vec<String>]) -> (Vec<Project>, usize) {
    let mut projects = Vec::new();
    let mut skipped = 0;
    for row in rows {
        let parts = (
            uuid_field(cell(row, 0)),
            text_field(cell(row, 1)),
            instant_field(cell(row, 3)),
            instant_field(cell(row, 4)),
        );
        let (Some(id), Some(name), Some(created_at), Some(updated_at)) = parts else {
            skipped += 1;
            continue;
        };
        projects.push(Project {
            id,
            name: normalize_project_name(&name),
            archived_at: instant_field(cell(row, 2)),
            created_at,
            updated_at,
        });
    }
    (projects, skipped)
}

fn normalize_tasks(rows: &[Vec<String>]) -> (Vec<Task>, usize, usize) {
    let mut tasks = Vec::new();
    let mut skipped = 0;
    let mut cleared = 0;
    for row in rows {
        let parts = (
            uuid_field(cell(row, 0)),
            text_field(cell(row, 1)),
            instant_field(cell(row, 5)),
            instant_field(cell(row, 6)),
        );
        let (Some(id), Some(title), Some(created_at), Some(updated_at)) = parts else {
            skipped += 1;
            continue;
        };
        tasks.push(Task {
            id,
            title: normalize_task_title(&title),
            completed: bool_field(cell(row, 2)).unwrap_or(false),
            project_id: reference_field(cell(row, 3), &mut cleared),
            archived_at: instant_field(cell(row, 4)),
            scheduled_for: None,
            pomodoro: PomodoroOverrides {
                work_minutes: override_field(cell(row, 7)),
                short_break_minutes: override_field(cell(row, 8)),
                long_break_minutes: override_field(cell(row, 9)),
                long_break_every: override_field(cell(row, 10)),
            },
            created_at,
            updated_at,
        });
    }
    (tasks, skipped, cleared)
}

fn normalize_sessions(rows: &[Vec<String>]) -> (Vec<Session>, usize, usize, usize) {
    let mut sessions = Vec::new();
    let mut skipped = 0;
    let mut cleared = 0;
    let mut synthesized = 0;
    for row in rows {
        let parts = (uuid_field(cell(row, 0)), instant_field(cell(row, 2)));
        let (Some(id), Some(started_at)) = parts else {
            skipped += 1;
            continue;
        };
        let duration_seconds = int_field(cell(row, 4)).filter(|seconds| *seconds >= 0);
        let mut ended_at = instant_field(cell(row, 3));
        if ended_at.is_none() {
            ended_at = duration_seconds
                .and_then(chrono::Duration::try_seconds)
                .and_then(|delta| started_at.checked_add_signed(delta));
            if ended_at.is_some() {
                synthesized += 1;
            } else {
                skipped += 1;
                continue;
            }
        }
        sessions.push(Session {
            id,
            task_id: reference_field(cell(row, 1), &mut cleared),
            started_at,
            ended_at,
            duration_seconds,
            music_url: text_field(cell(row, 5)),
            pomodoro_phase: PomodoroPhase::parse(cell(row, 6).trim()),
            pomodoro_phase_started_at: instant_field(cell(row, 7)),
            pomodoro_is_paused: bool_field(cell(row, 8)).unwrap_or(false),
            pomodoro_paused_at: instant_field(cell(row, 9)),
            pomodoro_cycle_count: int_field(cell(row, 10)).unwrap_or(0).max(0),
            edited_at: None,
            edit_reason: None,
        });
    }
    (sessions, skipped, cleared, synthesized)
}

fn normalize_events(rows: &[Vec<String>]) -> (Vec<PomodoroEvent>, usize, usize) {
    let mut events = Vec::new();
    let mut skipped = 0;
    let mut cleared = 0;
    for row in rows {
        let parts = (
            uuid_field(cell(row, 0)),
            uuid_field(cell(row, 1)),
            text_field(cell(row, 3)),
            instant_field(cell(row, 5)),
        );
        let (Some(id), Some(session_id), Some(event_type), Some(occurred_at)) = parts else {
            skipped += 1;
            continue;
        };
        events.push(PomodoroEvent {
            id,
            session_id,
            task_id: reference_field(cell(row, 2), &mut cleared),
            event_type,
            pomodoro_cycle_count: int_field(cell(row, 4)).unwrap_or(0).max(0),
            occurred_at,
        });
    }
    (events, skipped, cleared)
}

fn normalize_queue(rows: &[Vec<String>]) -> (Vec<QueueItem>, usize) {
    let mut items = Vec::new();
    let mut skipped = 0;
    for row in rows {
        let parts = (uuid_field(cell(row, 0)), instant_field(cell(row, 2)));
        let (Some(task_id), Some(created_at)) = parts else {
            skipped += 1;
            continue;
        };
        items.push(QueueItem {
            task_id,
            sort_order: int_field(cell(row, 1)).unwrap_or(0),
            created_at,
        });
    }
    (items, skipped)
}

fn normalize_settings(rows: &[Vec<String>]) -> (Option<UserSettings>, usize, usize, bool) {
    let mut candidate: Option<UserSettings> = None;
    let mut malformed = 0;
    let mut extra = 0;
    let mut cleared = false;
    for row in rows {
        if candidate.is_some() {
            extra += 1;
            continue;
        }
        let parts = (
            text_field(cell(row, 0)),
            instant_field(cell(row, 2)),
            instant_field(cell(row, 3)),
        );
        let (Some(timezone), Some(created_at), Some(updated_at)) = parts else {
            malformed += 1;
            continue;
        };
        let mut cleared_here = 0;
        let default_task_id = reference_field(cell(row, 1), &mut cleared_here);
        cleared |= cleared_here > 0;
        let defaults = UserSettings::defaults_at(created_at);
        candidate = Some(UserSettings {
            timezone,
            default_task_id,
            pomodoro_work_minutes: override_field(cell(row, 4))
                .unwrap_or(defaults.pomodoro_work_minutes),
            pomodoro_short_break_minutes: override_field(cell(row, 5))
                .unwrap_or(defaults.pomodoro_short_break_minutes),
            pomodoro_long_break_minutes: override_field(cell(row, 6))
                .unwrap_or(defaults.pomodoro_long_break_minutes),
            pomodoro_long_break_every: override_field(cell(row, 7))
                .unwrap_or(defaults.pomodoro_long_break_every),
            pomodoro_v2_enabled: bool_field(cell(row, 8)).unwrap_or(defaults.pomodoro_v2_enabled),
            auto_archive_enabled: defaults.auto_archive_enabled,
            created_at,
            updated_at,
        });
    }
    (candidate, malformed, extra, cleared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::export::{
        ExportService, EVENTS_HEADER, MANIFEST_HEADER, PROJECTS_HEADER, QUEUE_HEADER,
        SESSIONS_HEADER, SETTINGS_HEADER, TASKS_HEADER,
    };

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|cell| cell.to_string()).collect()
    }

    fn header(cells: &[&str]) -> Vec<String> {
        row(cells)
    }

    /// A valid workbook with every sheet empty apart from its header
    /// and a well-formed manifest. Tests push data rows onto it.
    fn empty_workbook() -> Workbook {
        Workbook {
            app: APP_IDENTIFIER.to_string(),
            sheets: vec![
                Sheet {
                    name: SHEET_MANIFEST.to_string(),
                    rows: vec![
                        header(MANIFEST_HEADER),
                        row(&["schema_version", "1"]),
                        row(&["app", "focusdeck"]),
                        row(&["exported_at", "2026-02-16T08:00:00+00:00"]),
                    ],
                },
                Sheet {
                    name: SHEET_PROJECTS.to_string(),
                    rows: vec![header(PROJECTS_HEADER)],
                },
                Sheet {
                    name: SHEET_TASKS.to_string(),
                    rows: vec![header(TASKS_HEADER)],
                },
                Sheet {
                    name: SHEET_SESSIONS.to_string(),
                    rows: vec![header(SESSIONS_HEADER)],
                },
                Sheet {
                    name: SHEET_EVENTS.to_string(),
                    rows: vec![header(EVENTS_HEADER)],
                },
                Sheet {
                    name: SHEET_QUEUE.to_string(),
                    rows: vec![header(QUEUE_HEADER)],
                },
                Sheet {
                    name: SHEET_SETTINGS.to_string(),
                    rows: vec![header(SETTINGS_HEADER)],
                },
            ],
        }
    }

    fn push_rows(workbook: &mut Workbook, sheet: &str, rows: Vec<Vec<String>>) {
        let target = workbook
            .sheets
            .iter_mut()
            .find(|candidate| candidate.name == sheet)
            .expect("known sheet");
        target.rows.extend(rows);
    }

    fn to_bytes(workbook: &Workbook) -> Vec<u8> {
        serde_json::to_vec(workbook).expect("serialize workbook")
    }

    const PROJECT_ID: &str = "5f0c23aa-8f21-4a3e-9a58-0b6c3f6d9a01";
    const TASK_ID: &str = "6a1d34bb-9032-4b4f-8b69-1c7d407eab12";

    fn seeded_store() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let t0 = fixed_time("2026-02-16T07:00:00Z");
        store
            .create_project(
                "owner-1",
                &Project {
                    id: PROJECT_ID.to_string(),
                    name: "Deep Work".to_string(),
                    archived_at: None,
                    created_at: t0,
                    updated_at: t0,
                },
            )
            .expect("project");
        store
            .create_task(
                "owner-1",
                &Task {
                    id: TASK_ID.to_string(),
                    title: "Draft outline".to_string(),
                    completed: false,
                    project_id: Some(PROJECT_ID.to_string()),
                    archived_at: None,
                    scheduled_for: None,
                    pomodoro: PomodoroOverrides::default(),
                    created_at: t0,
                    updated_at: t0,
                },
            )
            .expect("task");
        let session = store
            .start_session("owner-1", Some(TASK_ID), None, t0)
            .expect("start");
        store
            .pomodoro_init("owner-1", &session.id, t0)
            .expect("init");
        store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-16T07:25:00Z"))
            .expect("stop");
        store
            .task_queue_add("owner-1", TASK_ID, t0)
            .expect("queue");
        store
            .upsert_user_settings("owner-1", "Europe/Berlin", None, t0)
            .expect("settings");
        store
    }

    #[test]
    fn reimporting_an_export_is_idempotent() {
        let source = seeded_store();
        let exporter = ExportService::with_now_provider(
            Arc::clone(&source),
            Arc::new(|| fixed_time("2026-02-16T08:00:00Z")),
        );
        let upload = exporter.export_workbook("owner-1").expect("export");

        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let service = ImportService::new(Arc::clone(&target));

        let first = service
            .import("owner-1", upload.as_bytes(), ImportMode::Merge)
            .expect("first import");
        assert!(first.success);
        assert_eq!(first.imported.projects, 1);
        assert_eq!(first.imported.tasks, 1);
        assert_eq!(first.imported.sessions, 1);
        assert_eq!(first.imported.pomodoro_events, 2, "init and stop");
        assert_eq!(first.imported.queue, 1);
        assert_eq!(first.imported.settings, 1);
        assert_eq!(first.skipped, EntityCounts::default());
        assert!(first.warnings.is_empty(), "warnings: {:?}", first.warnings);

        let second = service
            .import("owner-1", upload.as_bytes(), ImportMode::Merge)
            .expect("second import");
        // The queue is always replaced; everything else trends to zero.
        assert_eq!(second.imported.projects, 0);
        assert_eq!(second.imported.tasks, 0);
        assert_eq!(second.imported.sessions, 0);
        assert_eq!(second.imported.pomodoro_events, 0);
        assert_eq!(second.imported.queue, 1);
        assert_eq!(second.imported.settings, 0);
        assert_eq!(second.skipped, EntityCounts::default());
        assert!(second.warnings.is_empty());

        let tasks = target.list_tasks("owner-1").expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].project_id.as_deref(), Some(PROJECT_ID));
    }

    #[test]
    fn archive_form_round_trips_too() {
        let source = seeded_store();
        let exporter = ExportService::with_now_provider(
            Arc::clone(&source),
            Arc::new(|| fixed_time("2026-02-16T08:00:00Z")),
        );
        let upload = exporter.export_archive("owner-1").expect("export");

        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", upload.as_bytes(), ImportMode::Merge)
            .expect("import");
        assert_eq!(summary.imported.projects, 1);
        assert_eq!(summary.imported.sessions, 1);
        assert_eq!(summary.imported.queue, 1);
        assert!(summary.warnings.is_empty(), "warnings: {:?}", summary.warnings);
    }

    #[test]
    fn merge_only_applies_strictly_newer_rows() {
        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let t0 = fixed_time("2026-02-16T07:00:00Z");
        target
            .create_project(
                "owner-1",
                &Project {
                    id: PROJECT_ID.to_string(),
                    name: "Current".to_string(),
                    archived_at: None,
                    created_at: t0,
                    updated_at: fixed_time("2026-02-16T09:00:00Z"),
                },
            )
            .expect("project");

        let mut stale = empty_workbook();
        push_rows(
            &mut stale,
            SHEET_PROJECTS,
            vec![row(&[
                PROJECT_ID,
                "Stale",
                "",
                "2026-02-16T07:00:00+00:00",
                "2026-02-16T08:00:00+00:00",
            ])],
        );
        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", &to_bytes(&stale), ImportMode::Merge)
            .expect("import");
        assert_eq!(summary.imported.projects, 0);
        assert_eq!(summary.skipped.projects, 0, "losers are not counted");
        assert_eq!(
            target.list_projects("owner-1").expect("list")[0].name,
            "Current"
        );
    }

    #[test]
    fn malformed_rows_skip_and_warn_without_aborting() {
        let mut upload = empty_workbook();
        push_rows(
            &mut upload,
            SHEET_PROJECTS,
            vec![
                // Bad id shape.
                row(&["p-1", "Broken", "", "2026-02-16T07:00:00+00:00", "2026-02-16T07:00:00+00:00"]),
                row(&[
                    PROJECT_ID,
                    "Kept",
                    "",
                    "2026-02-16T07:00:00+00:00",
                    "2026-02-16T07:00:00+00:00",
                ]),
            ],
        );
        push_rows(
            &mut upload,
            SHEET_TASKS,
            vec![row(&[
                TASK_ID,
                "Draft outline",
                "maybe",
                "not-a-uuid",
                "",
                "2026-02-16T07:00:00+00:00",
                "2026-02-16T07:00:00+00:00",
                "0",
                "",
                "",
                "",
            ])],
        );

        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect("import");

        assert_eq!(summary.imported.projects, 1);
        assert_eq!(summary.skipped.projects, 1);
        assert_eq!(summary.imported.tasks, 1);
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning.starts_with("projects: skipped 1 rows")));
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning == "tasks: cleared malformed project_id on 1 rows"));

        let task = &target.list_tasks("owner-1").expect("tasks")[0];
        assert_eq!(task.project_id, None);
        assert!(!task.completed, "unparseable boolean defaults to false");
        assert_eq!(task.pomodoro.work_minutes, None, "non-positive override");
    }

    #[test]
    fn sessions_synthesize_or_skip_missing_end_times() {
        let mut upload = empty_workbook();
        push_rows(
            &mut upload,
            SHEET_SESSIONS,
            vec![
                // ended_at missing, duration present: synthesized.
                row(&[
                    "7c2e45cc-a143-4c50-9c7a-2d8e518fbc23",
                    "",
                    "2026-02-16T07:00:00+00:00",
                    "",
                    "1500",
                    "",
                    "work",
                    "",
                    "false",
                    "",
                    "0",
                ]),
                // Neither ended_at nor duration: unresolvable.
                row(&[
                    "8d3f56dd-b254-4d61-8d8b-3e9f629fcd34",
                    "",
                    "2026-02-16T07:00:00+00:00",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                ]),
            ],
        );

        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect("import");

        assert_eq!(summary.imported.sessions, 1);
        assert_eq!(summary.skipped.sessions, 1);
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning.contains("synthesized ended_at")));

        let sessions = target.list_sessions("owner-1").expect("sessions");
        assert_eq!(sessions.len(), 1);
        assert_eq!(
            sessions[0].ended_at,
            Some(fixed_time("2026-02-16T07:25:00Z"))
        );
    }

    #[test]
    fn queue_filters_unknown_tasks_sorts_and_truncates() {
        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let t0 = fixed_time("2026-02-16T07:00:00Z");
        // Nine real tasks plus one queue row pointing nowhere.
        let mut task_ids = Vec::new();
        for index in 0..9 {
            let id = format!("9e4a67ee-c365-4e72-9e9c-4fa07300de{index:02}");
            target
                .create_task(
                    "owner-1",
                    &Task {
                        id: id.clone(),
                        title: format!("Task {index}"),
                        completed: false,
                        project_id: None,
                        archived_at: None,
                        scheduled_for: None,
                        pomodoro: PomodoroOverrides::default(),
                        created_at: t0,
                        updated_at: t0,
                    },
                )
                .expect("task");
            task_ids.push(id);
        }

        let mut upload = empty_workbook();
        let mut rows = Vec::new();
        // Descending sort_order so the importer has to re-sort.
        for (index, id) in task_ids.iter().enumerate() {
            rows.push(row(&[
                id,
                &(task_ids.len() - index).to_string(),
                "2026-02-16T07:00:00+00:00",
            ]));
        }
        rows.push(row(&[
            "00000000-0000-4000-8000-000000000000",
            "0",
            "2026-02-16T07:00:00+00:00",
        ]));
        push_rows(&mut upload, SHEET_QUEUE, rows);

        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect("import");

        assert_eq!(summary.imported.queue, 7);
        // One unknown reference plus two rows past the cap.
        assert_eq!(summary.skipped.queue, 3);
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning.contains("dropped 1 rows referencing unknown tasks")));
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning.contains("truncated to the first 7")));

        let queue = target.task_queue_list("owner-1").expect("queue");
        assert_eq!(queue.len(), 7);
        // Lowest incoming sort_order first, repacked densely.
        assert_eq!(queue[0].task_id, task_ids[8]);
        assert_eq!(queue[0].sort_order, 0);
        assert_eq!(queue[6].sort_order, 6);
    }

    #[test]
    fn settings_clear_unknown_default_task() {
        let mut upload = empty_workbook();
        push_rows(
            &mut upload,
            SHEET_SETTINGS,
            vec![row(&[
                "Europe/Berlin",
                "00000000-0000-4000-8000-000000000000",
                "2026-02-16T07:00:00+00:00",
                "2026-02-16T07:00:00+00:00",
                "50",
                "10",
                "20",
                "2",
                "true",
            ])],
        );

        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let summary = ImportService::new(Arc::clone(&target))
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect("import");

        assert_eq!(summary.imported.settings, 1);
        assert!(summary
            .warnings
            .iter()
            .any(|warning| warning.contains("cleared default_task_id")));
        let settings = target
            .stored_user_settings("owner-1")
            .expect("settings")
            .expect("stored");
        assert_eq!(settings.timezone, "Europe/Berlin");
        assert_eq!(settings.default_task_id, None);
        assert_eq!(settings.pomodoro_work_minutes, 50);
    }

    #[test]
    fn structural_problems_abort_before_any_write() {
        let target = Arc::new(SqliteStore::open_in_memory().expect("open store"));
        let service = ImportService::new(Arc::clone(&target));

        // A valid Projects sheet next to a Tasks sheet with a renamed
        // column: nothing may land.
        let mut upload = empty_workbook();
        push_rows(
            &mut upload,
            SHEET_PROJECTS,
            vec![row(&[
                PROJECT_ID,
                "Kept",
                "",
                "2026-02-16T07:00:00+00:00",
                "2026-02-16T07:00:00+00:00",
            ])],
        );
        let tasks_sheet = upload
            .sheets
            .iter_mut()
            .find(|sheet| sheet.name == SHEET_TASKS)
            .expect("tasks sheet");
        tasks_sheet.rows[0][1] = "name".to_string();

        let error = service
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect_err("header mismatch");
        assert!(matches!(error, AppError::Validation(_)));
        assert!(error.to_string().contains("Tasks"));
        assert!(target.list_projects("owner-1").expect("list").is_empty());

        // Manifest version mismatch.
        let mut upload = empty_workbook();
        upload.sheets[0].rows[1] = row(&["schema_version", "2"]);
        let error = service
            .import("owner-1", &to_bytes(&upload), ImportMode::Merge)
            .expect_err("schema_version mismatch");
        assert!(error.to_string().contains("schema_version"));

        // Archive missing a required file.
        let archive = Archive {
            files: std::collections::BTreeMap::from([(
                "manifest.csv".to_string(),
                "key,value\nschema_version,1\napp,focusdeck\n".to_string(),
            )]),
        };
        let error = service
            .import(
                "owner-1",
                &serde_json::to_vec(&archive).expect("serialize"),
                ImportMode::Merge,
            )
            .expect_err("missing file");
        assert!(error.to_string().contains("missing"));

        // Not an upload at all.
        let error = service
            .import("owner-1", b"[1,2,3]", ImportMode::Merge)
            .expect_err("not an upload");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn only_the_merge_mode_is_accepted() {
        assert_eq!(ImportMode::parse("merge").expect("merge"), ImportMode::Merge);
        assert_eq!(ImportMode::parse(" MERGE ").expect("case"), ImportMode::Merge);
        assert!(matches!(
            ImportMode::parse("replace"),
            Err(AppError::Validation(_))
        ));
    }
}
