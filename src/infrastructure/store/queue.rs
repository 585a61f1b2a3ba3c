use crate::domain::models::{QueueItem, QUEUE_CAPACITY};
use crate::infrastructure::change_feed::{ChangeOp, ChangeTable};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{parse_instant, SqliteStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

pub(crate) fn queue_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let created_at: String = row.get(2)?;
    Ok(QueueItem {
        task_id: row.get(0)?,
        sort_order: row.get(1)?,
        created_at: parse_instant(&created_at)?,
    })
}

fn list_in_tx(tx: &Transaction<'_>, owner: &str) -> Result<Vec<QueueItem>, AppError> {
    let mut statement = tx.prepare(
        "SELECT task_id, sort_order, created_at FROM task_queue_items
         WHERE owner_id = ?1 ORDER BY sort_order",
    )?;
    let items = statement
        .query_map(params![owner], queue_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

/// Rewrite the queue as the given items with dense orders 0..n-1. Delete
/// plus reinsert keeps the unique (owner, sort_order) index happy without
/// order juggling.
pub(crate) fn write_repacked(
    tx: &Transaction<'_>,
    owner: &str,
    items: &[QueueItem],
) -> Result<(), AppError> {
    tx.execute(
        "DELETE FROM task_queue_items WHERE owner_id = ?1",
        params![owner],
    )?;
    for (position, item) in items.iter().enumerate() {
        tx.execute(
            "INSERT INTO task_queue_items (owner_id, task_id, sort_order, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                owner,
                item.task_id,
                position as i64,
                item.created_at.to_rfc3339()
            ],
        )?;
    }
    Ok(())
}

impl SqliteStore {
    pub fn task_queue_list(&self, owner: &str) -> Result<Vec<QueueItem>, AppError> {
        let mut connection = self.lock()?;
        let tx = connection.transaction()?;
        let items = list_in_tx(&tx, owner)?;
        tx.commit()?;
        Ok(items)
    }

    /// Append a task to the queue. Re-adding a queued task is a no-op; a
    /// full queue raises the typed capacity condition. The capacity check
    /// and the insert share one transaction, so concurrent adds cannot
    /// overfill the queue.
    pub fn task_queue_add(
        &self,
        owner: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, AppError> {
        let (items, added) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;

            let task_row: Option<Option<String>> = tx
                .query_row(
                    "SELECT archived_at FROM tasks WHERE owner_id = ?1 AND id = ?2",
                    params![owner, task_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(archived_at) = task_row else {
                return Err(AppError::NotFound(format!("task {task_id}")));
            };
            if archived_at.is_some() {
                return Err(AppError::Validation(format!(
                    "task {task_id} is archived and cannot be queued"
                )));
            }

            let mut items = list_in_tx(&tx, owner)?;
            if items.iter().any(|item| item.task_id == task_id) {
                tx.commit()?;
                (items, false)
            } else if items.len() >= QUEUE_CAPACITY {
                return Err(AppError::QueueFull);
            } else {
                tx.execute(
                    "INSERT INTO task_queue_items (owner_id, task_id, sort_order, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![owner, task_id, items.len() as i64, now.to_rfc3339()],
                )?;
                items = list_in_tx(&tx, owner)?;
                tx.commit()?;
                (items, true)
            }
        };
        if added {
            self.publish(
                ChangeTable::TaskQueueItems,
                ChangeOp::Insert,
                owner,
                Some(task_id),
                None,
                now,
            );
        }
        Ok(items)
    }

    pub fn task_queue_remove(
        &self,
        owner: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, AppError> {
        let (items, removed) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            let mut items = list_in_tx(&tx, owner)?;
            let before = items.len();
            items.retain(|item| item.task_id != task_id);
            if items.len() == before {
                tx.commit()?;
                (items, false)
            } else {
                write_repacked(&tx, owner, &items)?;
                let items = list_in_tx(&tx, owner)?;
                tx.commit()?;
                (items, true)
            }
        };
        if removed {
            self.publish(
                ChangeTable::TaskQueueItems,
                ChangeOp::Delete,
                owner,
                None,
                Some(task_id),
                now,
            );
        }
        Ok(items)
    }

    pub fn task_queue_move_up(
        &self,
        owner: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, AppError> {
        self.swap_with_neighbor(owner, task_id, -1, now)
    }

    pub fn task_queue_move_down(
        &self,
        owner: &str,
        task_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, AppError> {
        self.swap_with_neighbor(owner, task_id, 1, now)
    }

    /// Swap the item with its neighbor one step up or down. At either end
    /// the move is a no-op. A missing item is a not-found condition.
    fn swap_with_neighbor(
        &self,
        owner: &str,
        task_id: &str,
        direction: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, AppError> {
        let (items, moved) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction()?;
            let mut items = list_in_tx(&tx, owner)?;
            let Some(position) = items.iter().position(|item| item.task_id == task_id) else {
                return Err(AppError::NotFound(format!("queued task {task_id}")));
            };
            let neighbor = position as i64 + direction;
            if neighbor < 0 || neighbor as usize >= items.len() {
                tx.commit()?;
                (items, false)
            } else {
                items.swap(position, neighbor as usize);
                write_repacked(&tx, owner, &items)?;
                let items = list_in_tx(&tx, owner)?;
                tx.commit()?;
                (items, true)
            }
        };
        if moved {
            self.publish(
                ChangeTable::TaskQueueItems,
                ChangeOp::Update,
                owner,
                Some(task_id),
                Some(task_id),
                now,
            );
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PomodoroOverrides, Task};
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn store_with_tasks(count: usize) -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("open store");
        for index in 0..count {
            let task = Task {
                id: format!("t-{index}"),
                title: format!("Task {index}"),
                completed: false,
                project_id: None,
                archived_at: None,
                scheduled_for: None,
                pomodoro: PomodoroOverrides::default(),
                created_at: fixed_time("2026-02-16T08:00:00Z"),
                updated_at: fixed_time("2026-02-16T08:00:00Z"),
            };
            store.create_task("owner-1", &task).expect("task");
        }
        store
    }

    fn assert_dense(items: &[QueueItem]) {
        for (position, item) in items.iter().enumerate() {
            assert_eq!(item.sort_order, position as i64);
        }
    }

    #[test]
    fn add_appends_until_capacity() {
        let store = store_with_tasks(9);
        for index in 0..QUEUE_CAPACITY {
            let items = store
                .task_queue_add("owner-1", &format!("t-{index}"), fixed_time("2026-02-16T09:00:00Z"))
                .expect("add");
            assert_eq!(items.len(), index + 1);
            assert_dense(&items);
        }

        let error = store
            .task_queue_add("owner-1", "t-7", fixed_time("2026-02-16T09:10:00Z"))
            .expect_err("eighth add");
        assert!(matches!(error, AppError::QueueFull));
    }

    #[test]
    fn add_rejects_unknown_and_archived_tasks() {
        let store = store_with_tasks(1);
        let missing = store.task_queue_add("owner-1", "t-9", fixed_time("2026-02-16T09:00:00Z"));
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        store
            .apply_task_fields(
                "owner-1",
                "t-0",
                "Task 0",
                false,
                None,
                Some(fixed_time("2026-02-16T08:30:00Z")),
                fixed_time("2026-02-16T08:30:00Z"),
            )
            .expect("archive");
        let archived = store.task_queue_add("owner-1", "t-0", fixed_time("2026-02-16T09:00:00Z"));
        assert!(matches!(archived, Err(AppError::Validation(_))));
    }

    #[test]
    fn re_adding_a_queued_task_changes_nothing() {
        let store = store_with_tasks(2);
        store
            .task_queue_add("owner-1", "t-0", fixed_time("2026-02-16T09:00:00Z"))
            .expect("add");
        let items = store
            .task_queue_add("owner-1", "t-0", fixed_time("2026-02-16T09:01:00Z"))
            .expect("re-add");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn remove_re_densifies() {
        let store = store_with_tasks(3);
        for index in 0..3 {
            store
                .task_queue_add("owner-1", &format!("t-{index}"), fixed_time("2026-02-16T09:00:00Z"))
                .expect("add");
        }
        let items = store
            .task_queue_remove("owner-1", "t-1", fixed_time("2026-02-16T09:05:00Z"))
            .expect("remove");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].task_id, "t-0");
        assert_eq!(items[1].task_id, "t-2");
        assert_dense(&items);
    }

    #[test]
    fn moves_swap_adjacent_items_and_stop_at_edges() {
        let store = store_with_tasks(3);
        for index in 0..3 {
            store
                .task_queue_add("owner-1", &format!("t-{index}"), fixed_time("2026-02-16T09:00:00Z"))
                .expect("add");
        }

        let items = store
            .task_queue_move_up("owner-1", "t-2", fixed_time("2026-02-16T09:05:00Z"))
            .expect("move up");
        let order: Vec<&str> = items.iter().map(|item| item.task_id.as_str()).collect();
        assert_eq!(order, vec!["t-0", "t-2", "t-1"]);

        // Top item cannot move further up.
        let items = store
            .task_queue_move_up("owner-1", "t-0", fixed_time("2026-02-16T09:06:00Z"))
            .expect("move up at top");
        let order: Vec<&str> = items.iter().map(|item| item.task_id.as_str()).collect();
        assert_eq!(order, vec!["t-0", "t-2", "t-1"]);
        assert_dense(&items);

        let missing = store.task_queue_move_down("owner-1", "t-9", fixed_time("2026-02-16T09:07:00Z"));
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    // Any sequence of add/remove/move keeps sort orders unique, dense from
    // zero, and the length at or under capacity.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]
        #[test]
        fn queue_invariant_holds_under_random_operations(
            operations in prop::collection::vec((0u8..4, 0usize..9), 1..40)
        ) {
            let store = store_with_tasks(9);
            let now = fixed_time("2026-02-16T09:00:00Z");
            for (kind, index) in operations {
                let task_id = format!("t-{index}");
                let result = match kind {
                    0 => store.task_queue_add("owner-1", &task_id, now),
                    1 => store.task_queue_remove("owner-1", &task_id, now),
                    2 => store.task_queue_move_up("owner-1", &task_id, now),
                    _ => store.task_queue_move_down("owner-1", &task_id, now),
                };
                match result {
                    Ok(items) => {
                        prop_assert!(items.len() <= QUEUE_CAPACITY);
                        for (position, item) in items.iter().enumerate() {
                            prop_assert_eq!(item.sort_order, position as i64);
                        }
                    }
                    Err(AppError::QueueFull) | Err(AppError::NotFound(_)) => {}
                    Err(other) => return Err(TestCaseError::fail(format!("unexpected: {other}"))),
                }
            }
        }
    }
}
