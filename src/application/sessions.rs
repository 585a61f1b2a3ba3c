use crate::application::NowProvider;
use crate::domain::models::{PomodoroEvent, Session};
use crate::domain::pomodoro::EffectivePomodoro;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use crate::infrastructure::store::sessions::SessionEdit;
use chrono::Utc;
use std::sync::Arc;

/// Session lifecycle plus the pomodoro phase transitions. The store owns
/// atomicity per session; this layer adds the clock and the effective
/// pomodoro configuration (settings with per-task overrides).
pub struct SessionService {
    store: Arc<SqliteStore>,
    now_provider: NowProvider,
}

impl SessionService {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn start(
        &self,
        owner: &str,
        task_id: Option<&str>,
        music_url: Option<&str>,
    ) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.start_session(owner, task_id, music_url, now)
    }

    pub fn stop(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.stop_session(owner, session_id, now)
    }

    pub fn active(&self, owner: &str) -> Result<Option<Session>, AppError> {
        self.store.get_active_session(owner)
    }

    pub fn list(&self, owner: &str) -> Result<Vec<Session>, AppError> {
        self.store.list_sessions(owner)
    }

    pub fn events(&self, owner: &str) -> Result<Vec<PomodoroEvent>, AppError> {
        self.store.list_pomodoro_events(owner)
    }

    pub fn edit(
        &self,
        owner: &str,
        session_id: &str,
        edit: SessionEdit,
    ) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.session_edit(owner, session_id, edit, now)
    }

    pub fn pomodoro_init(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.pomodoro_init(owner, session_id, now)
    }

    pub fn pomodoro_pause(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.pomodoro_pause(owner, session_id, now)
    }

    pub fn pomodoro_resume(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.pomodoro_resume(owner, session_id, now)
    }

    /// Skip advances the cadence, so it needs the long-break interval in
    /// effect for this session's task.
    pub fn pomodoro_skip(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        let session = self.store.get_session(owner, session_id)?;
        let settings = self.store.get_user_settings(owner, now)?;
        let task = match session.task_id.as_deref() {
            Some(task_id) => self.store.get_task(owner, task_id)?,
            None => None,
        };
        let effective = EffectivePomodoro::resolve(&settings, task.as_ref());
        self.store
            .pomodoro_skip_phase(owner, session_id, effective.long_break_every, now)
    }

    pub fn pomodoro_restart(&self, owner: &str, session_id: &str) -> Result<Session, AppError> {
        let now = (self.now_provider)();
        self.store.pomodoro_restart_phase(owner, session_id, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PomodoroPhase, Task};
    use chrono::{DateTime, Utc};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        value
            .parse::<DateTime<Utc>>()
            .expect("valid RFC3339 timestamp")
    }

    fn service_at(store: Arc<SqliteStore>, value: &str) -> SessionService {
        let now = fixed_time(value);
        SessionService::new(store).with_now_provider(Arc::new(move || now))
    }

    fn sample_task(store: &SqliteStore, owner: &str, long_break_every: i64) -> Task {
        let now = fixed_time("2026-02-16T08:00:00Z");
        let mut task = Task {
            id: "11111111-2222-3333-4444-555555555555".to_string(),
            title: "Deep work".to_string(),
            completed: false,
            project_id: None,
            archived_at: None,
            scheduled_for: None,
            pomodoro: Default::default(),
            created_at: now,
            updated_at: now,
        };
        task.pomodoro.long_break_every = Some(long_break_every);
        store.create_task(owner, &task).expect("create task");
        task
    }

    #[test]
    fn start_records_task_and_music() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let task = sample_task(&store, "owner-1", 4);
        let service = service_at(store, "2026-02-16T09:00:00Z");

        let session = service
            .start("owner-1", Some(&task.id), Some("https://lofi.example/mix"))
            .expect("start");
        assert_eq!(session.task_id.as_deref(), Some(task.id.as_str()));
        assert_eq!(session.music_url.as_deref(), Some("https://lofi.example/mix"));
        assert_eq!(session.started_at, fixed_time("2026-02-16T09:00:00Z"));

        let active = service.active("owner-1").expect("active");
        assert_eq!(active.map(|s| s.id), Some(session.id));
    }

    #[test]
    fn skip_follows_task_override_cadence() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let task = sample_task(&store, "owner-1", 2);
        let service = service_at(store, "2026-02-16T09:00:00Z");

        let session = service
            .start("owner-1", Some(&task.id), None)
            .expect("start");
        service
            .pomodoro_init("owner-1", &session.id)
            .expect("init");

        let after_first = service
            .pomodoro_skip("owner-1", &session.id)
            .expect("first skip");
        assert_eq!(after_first.pomodoro_phase, Some(PomodoroPhase::ShortBreak));
        assert_eq!(after_first.pomodoro_cycle_count, 1);

        let back_to_work = service
            .pomodoro_skip("owner-1", &session.id)
            .expect("second skip");
        assert_eq!(back_to_work.pomodoro_phase, Some(PomodoroPhase::Work));

        // Second completed work phase hits the override interval of two.
        let after_second_work = service
            .pomodoro_skip("owner-1", &session.id)
            .expect("third skip");
        assert_eq!(
            after_second_work.pomodoro_phase,
            Some(PomodoroPhase::LongBreak)
        );
        assert_eq!(after_second_work.pomodoro_cycle_count, 2);
    }

    #[test]
    fn skip_without_task_uses_settings_defaults() {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let service = service_at(store, "2026-02-16T09:00:00Z");

        let session = service.start("owner-1", None, None).expect("start");
        service
            .pomodoro_init("owner-1", &session.id)
            .expect("init");

        let mut current = session;
        // Default cadence rewards the fourth work phase.
        for _ in 0..6 {
            current = service
                .pomodoro_skip("owner-1", &current.id)
                .expect("skip");
            assert_ne!(current.pomodoro_phase, Some(PomodoroPhase::LongBreak));
        }
        current = service
            .pomodoro_skip("owner-1", &current.id)
            .expect("seventh skip");
        assert_eq!(current.pomodoro_phase, Some(PomodoroPhase::LongBreak));
        assert_eq!(current.pomodoro_cycle_count, 4);
    }
}
