use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Sessions,
    Tasks,
    TaskQueueItems,
}

impl ChangeTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTable::Sessions => "sessions",
            ChangeTable::Tasks => "tasks",
            ChangeTable::TaskQueueItems => "task_queue_items",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "insert",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }
}

/// One committed row mutation. Deletes carry only the pre-change id, so
/// consumers derive the entity id from whichever side is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowChange {
    pub table: ChangeTable,
    pub op: ChangeOp,
    pub owner_id: String,
    pub id_new: Option<String>,
    pub id_old: Option<String>,
    pub changed_at: DateTime<Utc>,
}

impl RowChange {
    /// Stable entity id: prefer the post-change row, fall back to the
    /// pre-change row.
    pub fn entity_id(&self) -> Option<&str> {
        self.id_new.as_deref().or(self.id_old.as_deref())
    }
}

/// Fan-out hub for committed row changes. The store publishes after each
/// commit; realtime adapters subscribe per tab. Lagging subscribers drop
/// the oldest events, which is fine: feeds only trigger refreshes.
#[derive(Debug, Clone)]
pub struct ChangeFeedHub {
    sender: broadcast::Sender<RowChange>,
}

impl ChangeFeedHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, change: RowChange) {
        // Send only fails when nobody is subscribed, which is not an error.
        let _ = self.sender.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeedHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_change(op: ChangeOp) -> RowChange {
        RowChange {
            table: ChangeTable::Tasks,
            op,
            owner_id: "owner-1".to_string(),
            id_new: Some("task-new".to_string()),
            id_old: Some("task-old".to_string()),
            changed_at: Utc::now(),
        }
    }

    use chrono::Utc;

    #[test]
    fn entity_id_prefers_post_change_row() {
        let mut change = sample_change(ChangeOp::Update);
        assert_eq!(change.entity_id(), Some("task-new"));
        change.id_new = None;
        assert_eq!(change.entity_id(), Some("task-old"));
        change.id_old = None;
        assert_eq!(change.entity_id(), None);
    }

    #[tokio::test]
    async fn subscribers_receive_published_changes() {
        let hub = ChangeFeedHub::default();
        let mut receiver = hub.subscribe();

        let change = sample_change(ChangeOp::Insert);
        hub.publish(change.clone());

        let received = receiver.recv().await.expect("change delivered");
        assert_eq!(received, change);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = ChangeFeedHub::default();
        hub.publish(sample_change(ChangeOp::Delete));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
