use crate::application::NowProvider;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use crate::infrastructure::store::trends::TrendPoint;
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;

/// Dashboard aggregates, bucketed by calendar day in the owner's
/// configured timezone.
pub struct TrendsService {
    store: Arc<SqliteStore>,
    now_provider: NowProvider,
}

impl TrendsService {
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

    pub fn dashboard(&self, owner: &str, days: i64) -> Result<Vec<TrendPoint>, AppError> {
        let now = (self.now_provider)();
        let settings = self.store.get_user_settings(owner, now)?;
        let timezone = settings.timezone.parse::<Tz>().map_err(|_| {
            AppError::Validation(format!("invalid timezone {:?}", settings.timezone))
        })?;
        self.store.get_dashboard_trends(owner, days, timezone, now)
    }
}
