use crate::domain::models::{ConnectionStatus, EntityKind, NotionConnection, NotionMapping};
use crate::infrastructure::error::AppError;
use crate::infrastructure::storage::{instant_opt_text, parse_instant, parse_instant_opt, SqliteStore};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

fn mapping_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotionMapping> {
    let kind_raw: String = row.get(0)?;
    Ok(NotionMapping {
        entity_kind: EntityKind::parse(&kind_raw).unwrap_or(EntityKind::Task),
        entity_id: row.get(1)?,
        page_id: row.get(2)?,
        last_pulled_at: parse_instant_opt(row.get(3)?)?,
    })
}

fn connection_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotionConnection> {
    let status_raw: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(NotionConnection {
        access_token: row.get(0)?,
        database_id: row.get(1)?,
        status: ConnectionStatus::parse(&status_raw).unwrap_or(ConnectionStatus::Idle),
        status_message: row.get(3)?,
        last_synced_at: parse_instant_opt(row.get(4)?)?,
        created_at: parse_instant(&created_at)?,
        updated_at: parse_instant(&updated_at)?,
    })
}

impl SqliteStore {
    pub fn list_notion_mappings(&self, owner: &str) -> Result<Vec<NotionMapping>, AppError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare(
            "SELECT entity_kind, entity_id, page_id, last_pulled_at
             FROM notion_mappings WHERE owner_id = ?1",
        )?;
        let mappings = statement
            .query_map(params![owner], mapping_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(mappings)
    }

    pub fn upsert_notion_mapping(
        &self,
        owner: &str,
        mapping: &NotionMapping,
    ) -> Result<(), AppError> {
        let connection = self.lock()?;
        connection.execute(
            "INSERT INTO notion_mappings (owner_id, entity_kind, entity_id, page_id, last_pulled_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(owner_id, entity_kind, entity_id) DO UPDATE SET
               page_id = excluded.page_id,
               last_pulled_at = excluded.last_pulled_at",
            params![
                owner,
                mapping.entity_kind.as_str(),
                mapping.entity_id,
                mapping.page_id,
                instant_opt_text(mapping.last_pulled_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_notion_connection(
        &self,
        owner: &str,
    ) -> Result<Option<NotionConnection>, AppError> {
        let connection = self.lock()?;
        let row = connection
            .query_row(
                "SELECT access_token, database_id, status, status_message, last_synced_at,
                        created_at, updated_at
                 FROM notion_connections WHERE owner_id = ?1",
                params![owner],
                connection_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn save_notion_connection(
        &self,
        owner: &str,
        access_token: &str,
        database_id: &str,
        now: DateTime<Utc>,
    ) -> Result<NotionConnection, AppError> {
        if access_token.trim().is_empty() || database_id.trim().is_empty() {
            return Err(AppError::Validation(
                "notion connection requires a token and a database id".to_string(),
            ));
        }
        let connection = self.lock()?;
        connection.execute(
            "INSERT INTO notion_connections
               (owner_id, access_token, database_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'idle', ?4, ?4)
             ON CONFLICT(owner_id) DO UPDATE SET
               access_token = excluded.access_token,
               database_id = excluded.database_id,
               status = 'idle',
               status_message = NULL,
               updated_at = excluded.updated_at",
            params![owner, access_token, database_id, now.to_rfc3339()],
        )?;
        let row = connection.query_row(
            "SELECT access_token, database_id, status, status_message, last_synced_at,
                    created_at, updated_at
             FROM notion_connections WHERE owner_id = ?1",
            params![owner],
            connection_from_row,
        )?;
        Ok(row)
    }

    /// Stamp the run outcome. `last_synced_at` is only advanced when
    /// provided; an error stamp keeps the previous successful time.
    pub fn mark_notion_connection(
        &self,
        owner: &str,
        status: ConnectionStatus,
        status_message: Option<&str>,
        last_synced_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let connection = self.lock()?;
        let updated = connection.execute(
            "UPDATE notion_connections SET
               status = ?2,
               status_message = ?3,
               last_synced_at = COALESCE(?4, last_synced_at),
               updated_at = ?5
             WHERE owner_id = ?1",
            params![
                owner,
                status.as_str(),
                status_message,
                instant_opt_text(last_synced_at),
                now.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!(
                "notion connection for owner {owner}"
            )));
        }
        Ok(())
    }
}
