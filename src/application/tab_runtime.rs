use crate::application::dedup::EventDedupCache;
use crate::application::leader::LeaderElector;
use crate::application::queue::QueueService;
use crate::application::realtime::{RealtimeAdapter, RealtimeSubscription, FOCUS_ROUTE};
use crate::application::refresh::{RefreshFn, RouteRefreshScheduler};
use crate::application::sessions::SessionService;
use crate::application::settings::SettingsService;
use crate::application::tab_bus::{CrossTabEvent, CrossTabReceiver, TabBus, TabTransport};
use crate::application::trends::TrendsService;
use crate::application::NowProvider;
use crate::domain::models::{QueueItem, Session, UserSettings};
use crate::infrastructure::error::AppError;
use crate::infrastructure::shared_state::SharedStateStore;
use crate::infrastructure::storage::SqliteStore;
use crate::infrastructure::store::trends::TrendPoint;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Everything one tab needs: the services, the cross-tab bus, leader
/// election, and the realtime-to-refresh bridge. Construct at session
/// startup; dropping tears the wiring down and relinquishes leadership.
pub struct TabRuntime {
    owner: String,
    sessions: SessionService,
    queue: QueueService,
    settings: SettingsService,
    trends: TrendsService,
    bus: Arc<TabBus>,
    leader: Arc<LeaderElector>,
    scheduler: Arc<RouteRefreshScheduler>,
    now_provider: NowProvider,
    leader_loop: JoinHandle<()>,
    _realtime: RealtimeSubscription,
}

impl TabRuntime {
    pub fn new(
        owner: &str,
        store: Arc<SqliteStore>,
        shared_state: Arc<dyn SharedStateStore>,
        transport: Arc<dyn TabTransport>,
        refresh: RefreshFn,
    ) -> Self {
        Self::with_clock(owner, store, shared_state, transport, refresh, Arc::new(Utc::now))
    }

    pub fn with_clock(
        owner: &str,
        store: Arc<SqliteStore>,
        shared_state: Arc<dyn SharedStateStore>,
        transport: Arc<dyn TabTransport>,
        refresh: RefreshFn,
        now_provider: NowProvider,
    ) -> Self {
        let bus = Arc::new(TabBus::new(transport));
        let leader = Arc::new(
            LeaderElector::new(shared_state, Arc::clone(&bus))
                .with_now_provider(Arc::clone(&now_provider)),
        );
        let scheduler = Arc::new(RouteRefreshScheduler::new(refresh));
        let realtime = RealtimeAdapter::new(
            Arc::new(EventDedupCache::new()),
            Arc::clone(&scheduler),
        )
        .subscribe(store.feed(), owner);
        let leader_loop = tokio::spawn(Arc::clone(&leader).run());

        Self {
            owner: owner.to_string(),
            sessions: SessionService::new(Arc::clone(&store))
                .with_now_provider(Arc::clone(&now_provider)),
            queue: QueueService::new(Arc::clone(&store))
                .with_now_provider(Arc::clone(&now_provider)),
            settings: SettingsService::new(Arc::clone(&store))
                .with_now_provider(Arc::clone(&now_provider)),
            trends: TrendsService::new(store).with_now_provider(Arc::clone(&now_provider)),
            bus,
            leader,
            scheduler,
            now_provider,
            leader_loop,
            _realtime: realtime,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn tab_id(&self) -> &str {
        self.bus.tab_id()
    }

    pub fn subscribe_events(&self) -> CrossTabReceiver {
        self.bus.subscribe()
    }

    pub fn schedule_refresh(&self, route: &str, reason: &str) {
        self.scheduler.schedule(route, reason);
    }

    // Leadership.

    pub fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }

    pub fn attempt_leadership(&self) -> Result<bool, AppError> {
        self.leader.attempt_claim()
    }

    pub fn set_visibility(&self, visible: bool) -> Result<(), AppError> {
        self.leader.set_visibility(visible);
        if visible {
            self.leader.attempt_claim()?;
        }
        Ok(())
    }

    pub fn set_focused(&self, focused: bool) -> Result<(), AppError> {
        self.leader.set_focused(focused);
        if focused {
            self.leader.attempt_claim()?;
        }
        Ok(())
    }

    // Session actions. Each one applies the change and then announces it
    // to sibling tabs.

    pub fn start_session(
        &self,
        task_id: Option<&str>,
        music_url: Option<&str>,
    ) -> Result<Session, AppError> {
        let session = self.sessions.start(&self.owner, task_id, music_url)?;
        self.announce("sessions", &session.id, "insert", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn stop_session(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.stop(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn active_session(&self) -> Result<Option<Session>, AppError> {
        self.sessions.active(&self.owner)
    }

    pub fn pomodoro_init(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.pomodoro_init(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn pomodoro_pause(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.pomodoro_pause(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn pomodoro_resume(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.pomodoro_resume(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn pomodoro_skip(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.pomodoro_skip(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    pub fn pomodoro_restart(&self, session_id: &str) -> Result<Session, AppError> {
        let session = self.sessions.pomodoro_restart(&self.owner, session_id)?;
        self.announce("sessions", &session.id, "update", FOCUS_ROUTE);
        Ok(session)
    }

    // Queue actions.

    pub fn queue(&self) -> Result<Vec<QueueItem>, AppError> {
        self.queue.list(&self.owner)
    }

    pub fn queue_add(&self, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let items = self.queue.add(&self.owner, task_id)?;
        self.announce("task_queue_items", task_id, "insert", FOCUS_ROUTE);
        Ok(items)
    }

    pub fn queue_remove(&self, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let items = self.queue.remove(&self.owner, task_id)?;
        self.announce("task_queue_items", task_id, "delete", FOCUS_ROUTE);
        Ok(items)
    }

    pub fn queue_move_up(&self, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let items = self.queue.move_up(&self.owner, task_id)?;
        self.announce("task_queue_items", task_id, "update", FOCUS_ROUTE);
        Ok(items)
    }

    pub fn queue_move_down(&self, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let items = self.queue.move_down(&self.owner, task_id)?;
        self.announce("task_queue_items", task_id, "update", FOCUS_ROUTE);
        Ok(items)
    }

    // Settings and aggregates.

    pub fn settings(&self) -> Result<UserSettings, AppError> {
        self.settings.get(&self.owner)
    }

    pub fn update_settings(
        &self,
        timezone: &str,
        default_task_id: Option<&str>,
    ) -> Result<UserSettings, AppError> {
        self.settings.update(&self.owner, timezone, default_task_id)
    }

    pub fn dashboard_trends(&self, days: i64) -> Result<Vec<TrendPoint>, AppError> {
        self.trends.dashboard(&self.owner, days)
    }

    fn announce(&self, entity_type: &str, entity_id: &str, operation: &str, route_hint: &str) {
        let event = CrossTabEvent::entity_changed(
            self.bus.tab_id(),
            (self.now_provider)(),
            entity_type,
            entity_id,
            operation,
            Some(route_hint),
        );
        if let Err(error) = self.bus.publish(event) {
            tracing::warn!(%error, "cross-tab announce failed");
        }
    }
}

impl Drop for TabRuntime {
    fn drop(&mut self) {
        self.leader_loop.abort();
        if let Err(error) = self.leader.release() {
            tracing::debug!(%error, "leadership release on teardown failed");
        }
    }
}
