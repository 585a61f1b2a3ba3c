use crate::application::NowProvider;
use crate::domain::models::UserSettings;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use chrono::Utc;
use std::sync::Arc;

pub struct SettingsService {
    store: Arc<SqliteStore>,
    now_provider: NowProvider,
}

impl SettingsService {
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

    /// Owners without a persisted row see the defaults; nothing is
    /// written until they change something.
    pub fn get(&self, owner: &str) -> Result<UserSettings, AppError> {
        let now = (self.now_provider)();
        self.store.get_user_settings(owner, now)
    }

    pub fn update(
        &self,
        owner: &str,
        timezone: &str,
        default_task_id: Option<&str>,
    ) -> Result<UserSettings, AppError> {
        let now = (self.now_provider)();
        self.store
            .upsert_user_settings(owner, timezone, default_task_id, now)
    }
}
