use crate::domain::models::{PomodoroEvent, PomodoroEventType, PomodoroPhase, Session};
use crate::domain::pomodoro;
use crate::infrastructure::change_feed::{ChangeOp, ChangeTable};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{
    instant_opt_text, is_unique_violation, parse_instant, parse_instant_opt, SqliteStore,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, task_id, started_at, ended_at, duration_seconds, music_url, \
     pomodoro_phase, pomodoro_phase_started_at, pomodoro_is_paused, pomodoro_paused_at, \
     pomodoro_cycle_count, edited_at, edit_reason";

/// Field changes applied by `session_edit`. `task_id` uses a nested option
/// so the caller can distinguish "leave alone" from "clear the link".
#[derive(Debug, Clone, Default)]
pub struct SessionEdit {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub task_id: Option<Option<String>>,
    pub edit_reason: Option<String>,
}

pub(crate) fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let started_at: String = row.get(2)?;
    let phase_raw: Option<String> = row.get(6)?;
    Ok(Session {
        id: row.get(0)?,
        task_id: row.get(1)?,
        started_at: parse_instant(&started_at)?,
        ended_at: parse_instant_opt(row.get(3)?)?,
        duration_seconds: row.get(4)?,
        music_url: row.get(5)?,
        // Unknown phase text degrades to "not set"; timer math then
        // treats the phase as work.
        pomodoro_phase: phase_raw.as_deref().and_then(PomodoroPhase::parse),
        pomodoro_phase_started_at: parse_instant_opt(row.get(7)?)?,
        pomodoro_is_paused: row.get(8)?,
        pomodoro_paused_at: parse_instant_opt(row.get(9)?)?,
        pomodoro_cycle_count: row.get(10)?,
        edited_at: parse_instant_opt(row.get(11)?)?,
        edit_reason: row.get(12)?,
    })
}

fn load_session(
    tx: &Transaction<'_>,
    owner: &str,
    session_id: &str,
) -> Result<Session, AppError> {
    let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE owner_id = ?1 AND id = ?2");
    tx.query_row(&query, params![owner, session_id], session_from_row)
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
}

fn update_session_row(
    tx: &Transaction<'_>,
    owner: &str,
    session: &Session,
) -> Result<(), AppError> {
    tx.execute(
        "UPDATE sessions SET
           task_id = ?3,
           started_at = ?4,
           ended_at = ?5,
           duration_seconds = ?6,
           pomodoro_phase = ?7,
           pomodoro_phase_started_at = ?8,
           pomodoro_is_paused = ?9,
           pomodoro_paused_at = ?10,
           pomodoro_cycle_count = ?11,
           edited_at = ?12,
           edit_reason = ?13
         WHERE owner_id = ?1 AND id = ?2",
        params![
            owner,
            session.id,
            session.task_id,
            session.started_at.to_rfc3339(),
            instant_opt_text(session.ended_at),
            session.duration_seconds,
            session.pomodoro_phase.map(|phase| phase.as_str()),
            instant_opt_text(session.pomodoro_phase_started_at),
            session.pomodoro_is_paused,
            instant_opt_text(session.pomodoro_paused_at),
            session.pomodoro_cycle_count,
            instant_opt_text(session.edited_at),
            session.edit_reason,
        ],
    )?;
    Ok(())
}

fn append_event(
    tx: &Transaction<'_>,
    owner: &str,
    session: &Session,
    event_type: PomodoroEventType,
    occurred_at: DateTime<Utc>,
) -> Result<(), AppError> {
    tx.execute(
        "INSERT INTO pomodoro_events
           (id, owner_id, session_id, task_id, event_type, pomodoro_cycle_count, occurred_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Uuid::new_v4().to_string(),
            owner,
            session.id,
            session.task_id,
            event_type.as_str(),
            session.pomodoro_cycle_count,
            occurred_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn ensure_task_exists(tx: &Transaction<'_>, owner: &str, task_id: &str) -> Result<(), AppError> {
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
    Ok(())
}

impl SqliteStore {
    pub fn get_active_session(&self, owner: &str) -> Result<Option<Session>, AppError> {
        let connection = self.lock()?;
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE owner_id = ?1 AND ended_at IS NULL");
        let session = connection
            .query_row(&query, params![owner], session_from_row)
            .optional()?;
        Ok(session)
    }

    pub fn get_session(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let session = load_session(&tx, owner, session_id)?;
        tx.commit()?;
        Ok(session)
    }

    /// Create the owner's active session. The partial unique index on
    /// un-ended rows turns a concurrent double-start into a typed
    /// "already active" condition instead of a second active row.
    pub fn start_session(
        &self,
        owner: &str,
        task_id: Option<&str>,
        music_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            if let Some(task_id) = task_id {
                ensure_task_exists(&tx, owner, task_id)?;
            }
            let session_id = Uuid::new_v4().to_string();
            let inserted = tx.execute(
                "INSERT INTO sessions
                   (id, owner_id, task_id, started_at, music_url,
                    pomodoro_is_paused, pomodoro_cycle_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                params![session_id, owner, task_id, now.to_rfc3339(), music_url],
            );
            if let Err(error) = inserted {
                if is_unique_violation(&error, "idx_sessions_one_active") {
                    return Err(AppError::SessionAlreadyActive);
                }
                return Err(error.into());
            }
            let session = load_session(&tx, owner, &session_id)?;
            tx.commit()?;
            session
        };
        self.publish(
            ChangeTable::Sessions,
            ChangeOp::Insert,
            owner,
            Some(&session.id),
            None,
            now,
        );
        Ok(session)
    }

    /// End the session. Stopping an already-ended session returns the row
    /// unchanged.
    pub fn stop_session(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let (session, changed) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            let mut session = load_session(&tx, owner, session_id)?;
            if session.ended_at.is_some() {
                tx.commit()?;
                (session, false)
            } else {
                session.ended_at = Some(now);
                session.duration_seconds =
                    Some((now - session.started_at).num_seconds().max(0));
                update_session_row(&tx, owner, &session)?;
                append_event(&tx, owner, &session, PomodoroEventType::Stop, now)?;
                tx.commit()?;
                (session, true)
            }
        };
        if changed {
            self.publish(
                ChangeTable::Sessions,
                ChangeOp::Update,
                owner,
                Some(&session.id),
                Some(&session.id),
                now,
            );
        }
        Ok(session)
    }

    pub fn session_edit(
        &self,
        owner: &str,
        session_id: &str,
        edit: SessionEdit,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            let mut session = load_session(&tx, owner, session_id)?;
            if let Some(started_at) = edit.started_at {
                session.started_at = started_at;
            }
            if let Some(ended_at) = edit.ended_at {
                session.ended_at = Some(ended_at);
            }
            if let Some(task_id) = edit.task_id {
                if let Some(task_id) = task_id.as_deref() {
                    ensure_task_exists(&tx, owner, task_id)?;
                }
                session.task_id = task_id;
            }
            if let Some(ended_at) = session.ended_at {
                if ended_at < session.started_at {
                    return Err(AppError::Validation(
                        "session end must not precede its start".to_string(),
                    ));
                }
                session.duration_seconds =
                    Some((ended_at - session.started_at).num_seconds().max(0));
            }
            session.edited_at = Some(now);
            if edit.edit_reason.is_some() {
                session.edit_reason = edit.edit_reason;
            }
            update_session_row(&tx, owner, &session)?;
            tx.commit()?;
            session
        };
        self.publish(
            ChangeTable::Sessions,
            ChangeOp::Update,
            owner,
            Some(&session.id),
            Some(&session.id),
            now,
        );
        Ok(session)
    }

    pub fn pomodoro_init(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.pomodoro_transition(owner, session_id, now, PomodoroEventType::Init, |session| {
            session.pomodoro_phase = Some(PomodoroPhase::Work);
            session.pomodoro_phase_started_at = Some(now);
            session.pomodoro_cycle_count = 0;
            session.pomodoro_is_paused = false;
            session.pomodoro_paused_at = None;
            Ok(true)
        })
    }

    /// Pausing an already-paused session is a no-op that returns the row.
    pub fn pomodoro_pause(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.pomodoro_transition(owner, session_id, now, PomodoroEventType::Pause, |session| {
            ensure_initialized(session)?;
            if session.pomodoro_is_paused {
                return Ok(false);
            }
            session.pomodoro_is_paused = true;
            session.pomodoro_paused_at = Some(now);
            Ok(true)
        })
    }

    /// Resume shifts the stored phase start forward by the paused span so
    /// elapsed time continues from where the pause froze it.
    pub fn pomodoro_resume(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.pomodoro_transition(owner, session_id, now, PomodoroEventType::Resume, |session| {
            ensure_initialized(session)?;
            if !session.pomodoro_is_paused {
                return Ok(false);
            }
            if let Some(started) = session.pomodoro_phase_started_at {
                let shifted_ms = pomodoro::adjust_phase_start_for_resume(
                    started.timestamp_millis() as f64,
                    session
                        .pomodoro_paused_at
                        .map(|paused| paused.timestamp_millis() as f64),
                    now.timestamp_millis() as f64,
                );
                session.pomodoro_phase_started_at =
                    DateTime::<Utc>::from_timestamp_millis(shifted_ms as i64);
            }
            session.pomodoro_is_paused = false;
            session.pomodoro_paused_at = None;
            Ok(true)
        })
    }

    pub fn pomodoro_skip_phase(
        &self,
        owner: &str,
        session_id: &str,
        long_break_every: i64,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.pomodoro_transition(
            owner,
            session_id,
            now,
            PomodoroEventType::SkipPhase,
            |session| {
                ensure_initialized(session)?;
                let transition = pomodoro::next_phase(
                    session.pomodoro_phase,
                    session.pomodoro_cycle_count,
                    long_break_every,
                );
                session.pomodoro_phase = Some(transition.next_phase);
                session.pomodoro_cycle_count = transition.next_cycle_count;
                session.pomodoro_phase_started_at = Some(now);
                session.pomodoro_is_paused = false;
                session.pomodoro_paused_at = None;
                Ok(true)
            },
        )
    }

    /// Restart the running phase from now. Phase, cycle count and pause
    /// flags are left as they are.
    pub fn pomodoro_restart_phase(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        self.pomodoro_transition(
            owner,
            session_id,
            now,
            PomodoroEventType::RestartPhase,
            |session| {
                ensure_initialized(session)?;
                session.pomodoro_phase_started_at = Some(now);
                Ok(true)
            },
        )
    }

    fn pomodoro_transition(
        &self,
        owner: &str,
        session_id: &str,
        now: DateTime<Utc>,
        event_type: PomodoroEventType,
        mutate: impl FnOnce(&mut Session) -> Result<bool, AppError>,
    ) -> Result<Session, AppError> {
        let (session, changed) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            let mut session = load_session(&tx, owner, session_id)?;
            if session.ended_at.is_some() {
                return Err(AppError::Validation(format!(
                    "session {session_id} has already ended"
                )));
            }
            let changed = mutate(&mut session)?;
            if changed {
                update_session_row(&tx, owner, &session)?;
                append_event(&tx, owner, &session, event_type, now)?;
            }
            tx.commit()?;
            (session, changed)
        };
        if changed {
            self.publish(
                ChangeTable::Sessions,
                ChangeOp::Update,
                owner,
                Some(&session.id),
                Some(&session.id),
                now,
            );
        }
        Ok(session)
    }

    pub fn list_sessions(&self, owner: &str) -> Result<Vec<Session>, AppError> {
        let connection = self.lock()?;
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE owner_id = ?1 ORDER BY started_at, id"
        );
        let mut statement = connection.prepare(&query)?;
        let sessions = statement
            .query_map(params![owner], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn list_pomodoro_events(&self, owner: &str) -> Result<Vec<PomodoroEvent>, AppError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "SELECT id, session_id, task_id, event_type, pomodoro_cycle_count, occurred_at
             FROM pomodoro_events WHERE owner_id = ?1 ORDER BY occurred_at, id",
        )?;
        let events = statement
            .query_map(params![owner], |row| {
                let occurred_at: String = row.get(5)?;
                Ok(PomodoroEvent {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    task_id: row.get(2)?,
                    event_type: row.get(3)?,
                    pomodoro_cycle_count: row.get(4)?,
                    occurred_at: parse_instant(&occurred_at)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn ensure_initialized(session: &Session) -> Result<(), AppError> {
    if session.pomodoro_phase.is_none() || session.pomodoro_phase_started_at.is_none() {
        return Err(AppError::Validation(format!(
            "session {} has no initialized pomodoro",
            session.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open store")
    }

    #[test]
    fn start_then_stop_records_duration() {
        let store = store();
        let started = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        assert!(started.ended_at.is_none());
        assert_eq!(
            store
                .get_active_session("owner-1")
                .expect("active")
                .map(|session| session.id),
            Some(started.id.clone())
        );

        let stopped = store
            .stop_session("owner-1", &started.id, fixed_time("2026-02-16T09:25:30Z"))
            .expect("stop");
        assert_eq!(stopped.duration_seconds, Some(25 * 60 + 30));
        assert!(store.get_active_session("owner-1").expect("active").is_none());
    }

    #[test]
    fn second_start_reports_already_active() {
        let store = store();
        store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        let error = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:01:00Z"))
            .expect_err("second start must fail");
        assert!(matches!(error, AppError::SessionAlreadyActive));

        // A different owner is unaffected.
        store
            .start_session("owner-2", None, None, fixed_time("2026-02-16T09:01:00Z"))
            .expect("other owner start");
    }

    #[test]
    fn stop_is_idempotent() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        let first = store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-16T09:10:00Z"))
            .expect("stop");
        let second = store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-16T09:20:00Z"))
            .expect("stop again");
        assert_eq!(first.ended_at, second.ended_at);
        assert_eq!(first.duration_seconds, second.duration_seconds);
    }

    #[test]
    fn transitions_require_an_existing_session() {
        let store = store();
        let error = store
            .pomodoro_init("owner-1", "missing", fixed_time("2026-02-16T09:00:00Z"))
            .expect_err("missing session");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[test]
    fn pause_freezes_and_resume_shifts_phase_start() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        store
            .pomodoro_init("owner-1", &session.id, fixed_time("2026-02-16T09:00:00Z"))
            .expect("init");

        let paused = store
            .pomodoro_pause("owner-1", &session.id, fixed_time("2026-02-16T09:10:00Z"))
            .expect("pause");
        assert!(paused.pomodoro_is_paused);

        // Pausing again changes nothing and appends no event.
        let paused_again = store
            .pomodoro_pause("owner-1", &session.id, fixed_time("2026-02-16T09:11:00Z"))
            .expect("pause again");
        assert_eq!(paused_again.pomodoro_paused_at, paused.pomodoro_paused_at);

        // Five minutes paused: the phase start moves forward five minutes.
        let resumed = store
            .pomodoro_resume("owner-1", &session.id, fixed_time("2026-02-16T09:15:00Z"))
            .expect("resume");
        assert!(!resumed.pomodoro_is_paused);
        assert_eq!(
            resumed.pomodoro_phase_started_at,
            Some(fixed_time("2026-02-16T09:05:00Z"))
        );

        let events = store.list_pomodoro_events("owner-1").expect("events");
        let kinds: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["init", "pause", "resume"]);
    }

    #[test]
    fn skip_walks_the_cadence() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        store
            .pomodoro_init("owner-1", &session.id, fixed_time("2026-02-16T09:00:00Z"))
            .expect("init");

        // work -> short_break (cycle 1)
        let after_first = store
            .pomodoro_skip_phase("owner-1", &session.id, 2, fixed_time("2026-02-16T09:25:00Z"))
            .expect("skip");
        assert_eq!(after_first.pomodoro_phase, Some(PomodoroPhase::ShortBreak));
        assert_eq!(after_first.pomodoro_cycle_count, 1);

        // break -> work (cycle unchanged)
        let back_to_work = store
            .pomodoro_skip_phase("owner-1", &session.id, 2, fixed_time("2026-02-16T09:30:00Z"))
            .expect("skip");
        assert_eq!(back_to_work.pomodoro_phase, Some(PomodoroPhase::Work));
        assert_eq!(back_to_work.pomodoro_cycle_count, 1);

        // work -> long_break (cycle 2, every 2)
        let long_break = store
            .pomodoro_skip_phase("owner-1", &session.id, 2, fixed_time("2026-02-16T09:55:00Z"))
            .expect("skip");
        assert_eq!(long_break.pomodoro_phase, Some(PomodoroPhase::LongBreak));
        assert_eq!(long_break.pomodoro_cycle_count, 2);
    }

    #[test]
    fn restart_resets_phase_start_only() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        store
            .pomodoro_init("owner-1", &session.id, fixed_time("2026-02-16T09:00:00Z"))
            .expect("init");
        store
            .pomodoro_skip_phase("owner-1", &session.id, 4, fixed_time("2026-02-16T09:25:00Z"))
            .expect("skip");

        let restarted = store
            .pomodoro_restart_phase("owner-1", &session.id, fixed_time("2026-02-16T09:27:00Z"))
            .expect("restart");
        assert_eq!(restarted.pomodoro_phase, Some(PomodoroPhase::ShortBreak));
        assert_eq!(restarted.pomodoro_cycle_count, 1);
        assert_eq!(
            restarted.pomodoro_phase_started_at,
            Some(fixed_time("2026-02-16T09:27:00Z"))
        );
    }

    #[test]
    fn transitions_reject_ended_sessions() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-16T09:30:00Z"))
            .expect("stop");
        let error = store
            .pomodoro_init("owner-1", &session.id, fixed_time("2026-02-16T09:31:00Z"))
            .expect_err("transition after stop");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn edit_recomputes_duration_and_stamps_audit_fields() {
        let store = store();
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-16T09:00:00Z"))
            .expect("start");
        store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-16T09:30:00Z"))
            .expect("stop");

        let edited = store
            .session_edit(
                "owner-1",
                &session.id,
                SessionEdit {
                    started_at: Some(fixed_time("2026-02-16T09:05:00Z")),
                    edit_reason: Some("forgot to start on time".to_string()),
                    ..SessionEdit::default()
                },
                fixed_time("2026-02-16T10:00:00Z"),
            )
            .expect("edit");
        assert_eq!(edited.duration_seconds, Some(25 * 60));
        assert_eq!(edited.edited_at, Some(fixed_time("2026-02-16T10:00:00Z")));
        assert_eq!(
            edited.edit_reason.as_deref(),
            Some("forgot to start on time")
        );

        let error = store
            .session_edit(
                "owner-1",
                &session.id,
                SessionEdit {
                    ended_at: Some(fixed_time("2026-02-16T08:00:00Z")),
                    ..SessionEdit::default()
                },
                fixed_time("2026-02-16T10:05:00Z"),
            )
            .expect_err("end before start");
        assert!(matches!(error, AppError::Validation(_)));
    }
}
