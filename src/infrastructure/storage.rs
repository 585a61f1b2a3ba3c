use crate::infrastructure::change_feed::{ChangeFeedHub, ChangeOp, ChangeTable, RowChange};
use crate::infrastructure::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Row store for all per-owner state. One connection behind a mutex; every
/// multi-statement operation runs in a transaction while the lock is held,
/// which is the serialization point the session and queue invariants rely
/// on. Interactive mutations to feed-visible tables are published on the
/// change feed after the lock is released; bulk import writes stay off
/// the feed.
pub struct SqliteStore {
    connection: Mutex<Connection>,
    feed: ChangeFeedHub,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let connection = Connection::open(path)?;
        connection.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            connection: Mutex::new(connection),
            feed: ChangeFeedHub::default(),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let connection = Connection::open_in_memory()?;
        connection.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            connection: Mutex::new(connection),
            feed: ChangeFeedHub::default(),
        })
    }

    pub fn feed(&self) -> &ChangeFeedHub {
        &self.feed
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.connection
            .lock()
            .map_err(|_| AppError::lock_poisoned("store connection"))
    }

    pub(crate) fn publish(
        &self,
        table: ChangeTable,
        op: ChangeOp,
        owner: &str,
        id_new: Option<&str>,
        id_old: Option<&str>,
        changed_at: DateTime<Utc>,
    ) {
        self.feed.publish(RowChange {
            table,
            op,
            owner_id: owner.to_string(),
            id_new: id_new.map(ToOwned::to_owned),
            id_old: id_old.map(ToOwned::to_owned),
            changed_at,
        });
    }
}

pub(crate) fn parse_instant(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
}

pub(crate) fn parse_instant_opt(raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_instant(&value)).transpose()
}

pub(crate) fn parse_day_opt(raw: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    raw.map(|value| {
        NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(error),
            )
        })
    })
    .transpose()
}

pub(crate) fn instant_opt_text(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|instant| instant.to_rfc3339())
}

pub(crate) fn day_opt_text(value: Option<NaiveDate>) -> Option<String> {
    value.map(|day| day.format("%Y-%m-%d").to_string())
}

/// True when the error is a unique-constraint violation whose message
/// names the given index or column set.
pub(crate) fn is_unique_violation(error: &rusqlite::Error, needle: &str) -> bool {
    match error {
        rusqlite::Error::SqliteFailure(failure, Some(message)) => {
            failure.code == rusqlite::ErrorCode::ConstraintViolation && message.contains(needle)
        }
        _ => false,
    }
}
