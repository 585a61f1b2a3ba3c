use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{parse_day_opt, parse_instant, SqliteStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TREND_WINDOW_MAX_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub focus_minutes: i64,
    pub completed_tasks: i64,
    /// Completed fraction of tasks scheduled for this day; absent when
    /// nothing was scheduled.
    pub on_time_rate: Option<f64>,
}

impl SqliteStore {
    /// Per-day aggregates for the owner's last `days` local days, oldest
    /// first. Days are bucketed in the user's timezone, not UTC, so a
    /// late-evening session lands on the day the user experienced.
    pub fn get_dashboard_trends(
        &self,
        owner: &str,
        days: i64,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrendPoint>, AppError> {
        let days = days.clamp(1, TREND_WINDOW_MAX_DAYS);
        let today = now.with_timezone(&timezone).date_naive();
        let window_start = today - Duration::days(days - 1);
        // One extra UTC day on each side covers every timezone offset.
        let fetch_floor = (now - Duration::days(days + 1)).to_rfc3339();

        let mut focus_seconds: HashMap<NaiveDate, i64> = HashMap::new();
        let mut completed: HashMap<NaiveDate, i64> = HashMap::new();
        let mut scheduled: HashMap<NaiveDate, (i64, i64)> = HashMap::new();

        {
            let connection = self.lock()?;

            let mut sessions = connection.prepare(
                "SELECT started_at, duration_seconds FROM sessions
                 WHERE owner_id = ?1 AND ended_at IS NOT NULL AND started_at >= ?2",
            )?;
            let rows = sessions.query_map(rusqlite::params![owner, fetch_floor], |row| {
                let started_at: String = row.get(0)?;
                let duration: Option<i64> = row.get(1)?;
                Ok((parse_instant(&started_at)?, duration.unwrap_or(0)))
            })?;
            for row in rows {
                let (started_at, duration) = row?;
                let day = started_at.with_timezone(&timezone).date_naive();
                if day >= window_start && day <= today {
                    *focus_seconds.entry(day).or_insert(0) += duration.max(0);
                }
            }

            let mut tasks = connection.prepare(
                "SELECT completed, updated_at, scheduled_for FROM tasks WHERE owner_id = ?1",
            )?;
            let rows = tasks.query_map(rusqlite::params![owner], |row| {
                let completed: bool = row.get(0)?;
                let updated_at: String = row.get(1)?;
                Ok((
                    completed,
                    parse_instant(&updated_at)?,
                    parse_day_opt(row.get(2)?)?,
                ))
            })?;
            for row in rows {
                let (is_completed, updated_at, scheduled_for) = row?;
                if is_completed {
                    let day = updated_at.with_timezone(&timezone).date_naive();
                    if day >= window_start && day <= today {
                        *completed.entry(day).or_insert(0) += 1;
                    }
                }
                if let Some(day) = scheduled_for {
                    if day >= window_start && day <= today {
                        let entry = scheduled.entry(day).or_insert((0, 0));
                        entry.0 += 1;
                        if is_completed {
                            entry.1 += 1;
                        }
                    }
                }
            }
        }

        let mut points = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = window_start + Duration::days(offset);
            let on_time_rate = scheduled
                .get(&date)
                .map(|(total, done)| *done as f64 / *total as f64);
            points.push(TrendPoint {
                date,
                focus_minutes: focus_seconds.get(&date).copied().unwrap_or(0) / 60,
                completed_tasks: completed.get(&date).copied().unwrap_or(0),
                on_time_rate,
            });
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{PomodoroOverrides, Task};

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn insert_task(store: &SqliteStore, id: &str, completed: bool, updated: &str, scheduled: Option<&str>) {
        let task = Task {
            id: id.to_string(),
            title: format!("Task {id}"),
            completed,
            project_id: None,
            archived_at: None,
            scheduled_for: scheduled.map(day),
            pomodoro: PomodoroOverrides::default(),
            created_at: fixed_time("2026-02-10T08:00:00Z"),
            updated_at: fixed_time(updated),
        };
        store.create_task("owner-1", &task).expect("task");
    }

    #[test]
    fn buckets_sessions_by_local_day() {
        let store = SqliteStore::open_in_memory().expect("open store");
        // 23:30 UTC on Feb 15 is already Feb 16 in Berlin (+01:00).
        let session = store
            .start_session("owner-1", None, None, fixed_time("2026-02-15T23:30:00Z"))
            .expect("start");
        store
            .stop_session("owner-1", &session.id, fixed_time("2026-02-15T23:55:00Z"))
            .expect("stop");

        let points = store
            .get_dashboard_trends(
                "owner-1",
                3,
                chrono_tz::Europe::Berlin,
                fixed_time("2026-02-16T12:00:00Z"),
            )
            .expect("trends");
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].date, day("2026-02-16"));
        assert_eq!(points[2].focus_minutes, 25);
        assert_eq!(points[1].focus_minutes, 0);
    }

    #[test]
    fn on_time_rate_counts_only_scheduled_days() {
        let store = SqliteStore::open_in_memory().expect("open store");
        insert_task(&store, "t-1", true, "2026-02-16T10:00:00Z", Some("2026-02-16"));
        insert_task(&store, "t-2", false, "2026-02-16T11:00:00Z", Some("2026-02-16"));
        insert_task(&store, "t-3", true, "2026-02-16T12:00:00Z", None);

        let points = store
            .get_dashboard_trends(
                "owner-1",
                2,
                chrono_tz::UTC,
                fixed_time("2026-02-16T18:00:00Z"),
            )
            .expect("trends");
        let today = &points[1];
        assert_eq!(today.date, day("2026-02-16"));
        assert_eq!(today.completed_tasks, 2);
        assert_eq!(today.on_time_rate, Some(0.5));
        // Yesterday had nothing scheduled.
        assert_eq!(points[0].on_time_rate, None);
    }

    #[test]
    fn window_is_clamped() {
        let store = SqliteStore::open_in_memory().expect("open store");
        let points = store
            .get_dashboard_trends(
                "owner-1",
                500,
                chrono_tz::UTC,
                fixed_time("2026-02-16T12:00:00Z"),
            )
            .expect("trends");
        assert_eq!(points.len(), TREND_WINDOW_MAX_DAYS as usize);

        let points = store
            .get_dashboard_trends(
                "owner-1",
                0,
                chrono_tz::UTC,
                fixed_time("2026-02-16T12:00:00Z"),
            )
            .expect("trends");
        assert_eq!(points.len(), 1);
    }
}
