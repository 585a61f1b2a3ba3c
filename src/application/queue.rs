use crate::application::NowProvider;
use crate::domain::models::QueueItem;
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::SqliteStore;
use chrono::Utc;
use std::sync::Arc;

/// Bounded work queue. Capacity and ordering invariants live in the
/// store; every mutation returns the full post-change queue so callers
/// can render without a second read.
pub struct QueueService {
    store: Arc<SqliteStore>,
    now_provider: NowProvider,
}

impl QueueService {
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

    pub fn list(&self, owner: &str) -> Result<Vec<QueueItem>, AppError> {
        self.store.task_queue_list(owner)
    }

    pub fn add(&self, owner: &str, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let now = (self.now_provider)();
        self.store.task_queue_add(owner, task_id, now)
    }

    pub fn remove(&self, owner: &str, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let now = (self.now_provider)();
        self.store.task_queue_remove(owner, task_id, now)
    }

    pub fn move_up(&self, owner: &str, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let now = (self.now_provider)();
        self.store.task_queue_move_up(owner, task_id, now)
    }

    pub fn move_down(&self, owner: &str, task_id: &str) -> Result<Vec<QueueItem>, AppError> {
        let now = (self.now_provider)();
        self.store.task_queue_move_down(owner, task_id, now)
    }
}
