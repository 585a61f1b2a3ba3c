use crate::application::dedup::EventDedupCache;
use crate::application::refresh::RouteRefreshScheduler;
use crate::infrastructure::change_feed::{ChangeFeedHub, ChangeTable, RowChange};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

const DEDUP_BUCKET_MS: i64 = 1_500;

pub const FOCUS_ROUTE: &str = "/focus";
pub const TASKS_ROUTE: &str = "/tasks";

/// Route whose view renders rows from the given table.
pub fn route_for_table(table: ChangeTable) -> &'static str {
    match table {
        ChangeTable::Sessions | ChangeTable::TaskQueueItems => FOCUS_ROUTE,
        ChangeTable::Tasks => TASKS_ROUTE,
    }
}

/// Dedup key for a row change. Near-simultaneous updates to the same row
/// fall into the same coarse time bucket and collapse; a genuinely later
/// edit lands in the next bucket and passes through.
pub fn change_dedup_key(change: &RowChange) -> Option<String> {
    let entity_id = change.entity_id()?;
    let bucket = change.changed_at.timestamp_millis() / DEDUP_BUCKET_MS;
    Some(format!(
        "{}:{}:{entity_id}:{bucket}",
        change.table.as_str(),
        change.op.as_str()
    ))
}

/// Bridges the row-change feed to the refresh scheduler for one owner.
pub struct RealtimeAdapter {
    dedup: Arc<EventDedupCache>,
    scheduler: Arc<RouteRefreshScheduler>,
}

impl RealtimeAdapter {
    pub fn new(dedup: Arc<EventDedupCache>, scheduler: Arc<RouteRefreshScheduler>) -> Self {
        Self { dedup, scheduler }
    }

    /// Start forwarding this owner's changes. The subscription lives
    /// until the returned handle is dropped.
    pub fn subscribe(&self, hub: &ChangeFeedHub, owner: &str) -> RealtimeSubscription {
        let mut receiver = hub.subscribe();
        let owner = owner.to_string();
        let dedup = Arc::clone(&self.dedup);
        let scheduler = Arc::clone(&self.scheduler);
        let handle = tokio::spawn(async move {
            loop {
                let change = match receiver.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "realtime feed lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => return,
                };
                if change.owner_id != owner {
                    continue;
                }
                let Some(key) = change_dedup_key(&change) else {
                    continue;
                };
                if dedup.consume(&key) {
                    scheduler.schedule(route_for_table(change.table), &key);
                }
            }
        });
        RealtimeSubscription { handle }
    }
}

pub struct RealtimeSubscription {
    handle: JoinHandle<()>,
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
