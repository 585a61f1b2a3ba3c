use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const PROJECT_NAME_MAX_CHARS: usize = 120;
pub const TASK_TITLE_MAX_CHARS: usize = 500;
pub const QUEUE_CAPACITY: usize = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroPhase {
    Work,
    ShortBreak,
    LongBreak,
}

impl PomodoroPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroPhase::Work => "work",
            PomodoroPhase::ShortBreak => "short_break",
            PomodoroPhase::LongBreak => "long_break",
        }
    }

    pub fn parse(value: &str) -> Option<PomodoroPhase> {
        match value {
            "work" => Some(PomodoroPhase::Work),
            "short_break" => Some(PomodoroPhase::ShortBreak),
            "long_break" => Some(PomodoroPhase::LongBreak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PomodoroEventType {
    Init,
    Pause,
    Resume,
    SkipPhase,
    RestartPhase,
    Stop,
}

impl PomodoroEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PomodoroEventType::Init => "init",
            PomodoroEventType::Pause => "pause",
            PomodoroEventType::Resume => "resume",
            PomodoroEventType::SkipPhase => "skip_phase",
            PomodoroEventType::RestartPhase => "restart_phase",
            PomodoroEventType::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "project.id")?;
        validate_non_empty(&self.name, "project.name")?;
        if self.name.chars().count() > PROJECT_NAME_MAX_CHARS {
            return Err(format!(
                "project.name must be at most {PROJECT_NAME_MAX_CHARS} characters"
            ));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }
}

/// Per-task pomodoro overrides; `None` falls through to the user defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroOverrides {
    pub work_minutes: Option<i64>,
    pub short_break_minutes: Option<i64>,
    pub long_break_minutes: Option<i64>,
    pub long_break_every: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub completed: bool,
    pub project_id: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<NaiveDate>,
    pub pomodoro: PomodoroOverrides,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task.id")?;
        validate_non_empty(&self.title, "task.title")?;
        if self.title.chars().count() > TASK_TITLE_MAX_CHARS {
            return Err(format!(
                "task.title must be at most {TASK_TITLE_MAX_CHARS} characters"
            ));
        }
        for (value, field) in [
            (self.pomodoro.work_minutes, "task.pomodoro_work_minutes"),
            (
                self.pomodoro.short_break_minutes,
                "task.pomodoro_short_break_minutes",
            ),
            (
                self.pomodoro.long_break_minutes,
                "task.pomodoro_long_break_minutes",
            ),
            (
                self.pomodoro.long_break_every,
                "task.pomodoro_long_break_every",
            ),
        ] {
            if let Some(value) = value {
                if value <= 0 {
                    return Err(format!("{field} must be > 0 when set"));
                }
            }
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub music_url: Option<String>,
    pub pomodoro_phase: Option<PomodoroPhase>,
    pub pomodoro_phase_started_at: Option<DateTime<Utc>>,
    pub pomodoro_is_paused: bool,
    pub pomodoro_paused_at: Option<DateTime<Utc>>,
    pub pomodoro_cycle_count: i64,
    pub edited_at: Option<DateTime<Utc>>,
    pub edit_reason: Option<String>,
}

impl Session {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "session.id")?;
        if let Some(ended_at) = self.ended_at {
            if ended_at < self.started_at {
                return Err("session.ended_at must be >= session.started_at".to_string());
            }
        }
        if let Some(duration) = self.duration_seconds {
            if duration < 0 {
                return Err("session.duration_seconds must be >= 0".to_string());
            }
        }
        if self.pomodoro_cycle_count < 0 {
            return Err("session.pomodoro_cycle_count must be >= 0".to_string());
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PomodoroEvent {
    pub id: String,
    pub session_id: String,
    pub task_id: Option<String>,
    pub event_type: String,
    pub pomodoro_cycle_count: i64,
    pub occurred_at: DateTime<Utc>,
}

impl PomodoroEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "pomodoro_event.id")?;
        validate_non_empty(&self.session_id, "pomodoro_event.session_id")?;
        validate_non_empty(&self.event_type, "pomodoro_event.event_type")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItem {
    pub task_id: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSettings {
    pub timezone: String,
    pub default_task_id: Option<String>,
    pub pomodoro_work_minutes: i64,
    pub pomodoro_short_break_minutes: i64,
    pub pomodoro_long_break_minutes: i64,
    pub pomodoro_long_break_every: i64,
    pub pomodoro_v2_enabled: bool,
    pub auto_archive_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn defaults_at(now: DateTime<Utc>) -> UserSettings {
        UserSettings {
            timezone: "UTC".to_string(),
            default_task_id: None,
            pomodoro_work_minutes: 25,
            pomodoro_short_break_minutes: 5,
            pomodoro_long_break_minutes: 15,
            pomodoro_long_break_every: 4,
            pomodoro_v2_enabled: true,
            auto_archive_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_timezone(&self.timezone, "settings.timezone")?;
        for (value, field) in [
            (self.pomodoro_work_minutes, "settings.pomodoro_work_minutes"),
            (
                self.pomodoro_short_break_minutes,
                "settings.pomodoro_short_break_minutes",
            ),
            (
                self.pomodoro_long_break_minutes,
                "settings.pomodoro_long_break_minutes",
            ),
            (
                self.pomodoro_long_break_every,
                "settings.pomodoro_long_break_every",
            ),
        ] {
            if value <= 0 {
                return Err(format!("{field} must be > 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Project => "project",
            EntityKind::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<EntityKind> {
        match value {
            "project" => Some(EntityKind::Project),
            "task" => Some(EntityKind::Task),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotionMapping {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub page_id: String,
    pub last_pulled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Idle,
    Success,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Success => "success",
            ConnectionStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<ConnectionStatus> {
        match value {
            "idle" => Some(ConnectionStatus::Idle),
            "success" => Some(ConnectionStatus::Success),
            "error" => Some(ConnectionStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotionConnection {
    pub access_token: String,
    pub database_id: String,
    pub status: ConnectionStatus,
    pub status_message: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Trim, substitute the placeholder when empty, and cap the length.
/// Both the sync engine and the importer run names through this.
pub fn normalize_project_name(raw: &str) -> String {
    normalize_name(raw, "Untitled project", PROJECT_NAME_MAX_CHARS)
}

pub fn normalize_task_title(raw: &str) -> String {
    normalize_name(raw, "Untitled task", TASK_TITLE_MAX_CHARS)
}

fn normalize_name(raw: &str, placeholder: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return placeholder.to_string();
    }
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect()
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

fn validate_timezone(value: &str, field_name: &str) -> Result<(), String> {
    value
        .parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| format!("{field_name} must be a valid IANA timezone"))
}
