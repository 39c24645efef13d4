//! SQLite-backed implementation of the processing log store.
//!
//! Queries run on the blocking pool; the async port methods clone what they
//! need and hand off to `spawn_blocking`. The partial unique index on
//! pending rows (see `schema.sql`) backs the one-outstanding-intent
//! invariant against concurrent schedulers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, Row, ToSql};
use tokio::task;
use tracing::warn;
use umbono_core::ProcessingLogStore;
use umbono_domain::{
    EntityType, Partner, ProcessingAction, ProcessingLog, ProcessingStatus,
    Result as DomainResult, UmbonoError,
};

use super::manager::{map_sql_error, DbManager};

/// SQLite-backed processing log repository.
pub struct SqliteProcessingLogRepository {
    db: Arc<DbManager>,
}

impl SqliteProcessingLogRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn insert_row(conn: &Connection, row: &ProcessingLog) -> DomainResult<()> {
        conn.execute(
            LOG_INSERT_SQL,
            params![
                row.id,
                row.entity_type.to_string(),
                row.opportunity_id,
                row.partner.to_string(),
                row.action.to_string(),
                row.status.to_string(),
                row.entity_external_id,
                row.error_reason,
                row.retry_count.map(i64::from),
                row.date_created,
                row.date_modified,
            ],
        )
        .map_err(map_sql_error)?;
        Ok(())
    }

    fn update_row(conn: &Connection, row: &ProcessingLog) -> DomainResult<()> {
        let now = Utc::now().timestamp();
        let changed = conn
            .execute(
                LOG_UPDATE_SQL,
                params![
                    row.id,
                    row.status.to_string(),
                    row.entity_external_id,
                    row.error_reason,
                    row.retry_count.map(i64::from),
                    now,
                ],
            )
            .map_err(map_sql_error)?;

        if changed == 0 {
            return Err(UmbonoError::NotFound(format!("processing log '{}'", row.id)));
        }
        Ok(())
    }

    fn fetch_latest(
        conn: &Connection,
        entity_type: EntityType,
        entity_id: &str,
        partner: Option<Partner>,
    ) -> DomainResult<Option<ProcessingLog>> {
        let entity_type = entity_type.to_string();
        let result = match partner {
            Some(partner) => conn.query_row(
                LOG_LATEST_FOR_PARTNER_SQL,
                params![entity_type, entity_id, partner.to_string()],
                map_log_row,
            ),
            None => conn.query_row(
                LOG_LATEST_FOR_ENTITY_SQL,
                params![entity_type, entity_id],
                map_log_row,
            ),
        };

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(map_sql_error(err)),
        }
    }

    fn fetch_pending(
        conn: &Connection,
        batch_size: usize,
        ids_to_skip: &[String],
    ) -> DomainResult<Vec<ProcessingLog>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {LOG_COLUMNS} FROM processing_log WHERE status = 'pending'"
        );
        if !ids_to_skip.is_empty() {
            let placeholders = vec!["?"; ids_to_skip.len()].join(", ");
            sql.push_str(&format!(" AND id NOT IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY date_modified ASC, rowid ASC LIMIT ?");

        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
        let mut bind: Vec<&dyn ToSql> =
            ids_to_skip.iter().map(|id| id as &dyn ToSql).collect();
        bind.push(&limit);

        let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(bind.as_slice(), map_log_row)
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<ProcessingLog>>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }

    fn fetch_needs_attention(conn: &Connection) -> DomainResult<Vec<ProcessingLog>> {
        let mut stmt = conn.prepare(LOG_NEEDS_ATTENTION_SQL).map_err(map_sql_error)?;
        let rows = stmt
            .query_map(params![], map_log_row)
            .map_err(map_sql_error)?
            .collect::<rusqlite::Result<Vec<ProcessingLog>>>()
            .map_err(map_sql_error)?;
        Ok(rows)
    }
}

#[async_trait]
impl ProcessingLogStore for SqliteProcessingLogRepository {
    async fn insert(&self, row: &ProcessingLog) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let to_insert = row.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            Self::insert_row(&conn, &to_insert)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update(&self, row: &ProcessingLog) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let to_update = row.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            Self::update_row(&conn, &to_update)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn latest_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DomainResult<Option<ProcessingLog>> {
        let db = Arc::clone(&self.db);
        let entity_id = entity_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<ProcessingLog>> {
            let conn = db.get_connection()?;
            Self::fetch_latest(&conn, entity_type, &entity_id, None)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn latest_for_partner(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        partner: Partner,
    ) -> DomainResult<Option<ProcessingLog>> {
        let db = Arc::clone(&self.db);
        let entity_id = entity_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<ProcessingLog>> {
            let conn = db.get_connection()?;
            Self::fetch_latest(&conn, entity_type, &entity_id, Some(partner))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_pending(
        &self,
        batch_size: usize,
        ids_to_skip: &[String],
    ) -> DomainResult<Vec<ProcessingLog>> {
        let db = Arc::clone(&self.db);
        let ids_to_skip = ids_to_skip.to_vec();

        task::spawn_blocking(move || -> DomainResult<Vec<ProcessingLog>> {
            let conn = db.get_connection()?;
            Self::fetch_pending(&conn, batch_size, &ids_to_skip)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_needs_attention(&self) -> DomainResult<Vec<ProcessingLog>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<ProcessingLog>> {
            let conn = db.get_connection()?;
            Self::fetch_needs_attention(&conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

const LOG_COLUMNS: &str = "id, entity_type, opportunity_id, partner, action, status, \
     entity_external_id, error_reason, retry_count, date_created, date_modified";

const LOG_INSERT_SQL: &str = "INSERT INTO processing_log (
        id, entity_type, opportunity_id, partner, action, status,
        entity_external_id, error_reason, retry_count, date_created, date_modified
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

const LOG_UPDATE_SQL: &str = "UPDATE processing_log SET
        status = ?2, entity_external_id = ?3, error_reason = ?4,
        retry_count = ?5, date_modified = ?6
    WHERE id = ?1";

const LOG_LATEST_FOR_ENTITY_SQL: &str = "SELECT id, entity_type, opportunity_id, partner, action, status,
        entity_external_id, error_reason, retry_count, date_created, date_modified
    FROM processing_log
    WHERE entity_type = ?1 AND opportunity_id = ?2 AND status != 'aborted'
    ORDER BY date_modified DESC, rowid DESC
    LIMIT 1";

const LOG_LATEST_FOR_PARTNER_SQL: &str = "SELECT id, entity_type, opportunity_id, partner, action, status,
        entity_external_id, error_reason, retry_count, date_created, date_modified
    FROM processing_log
    WHERE entity_type = ?1 AND opportunity_id = ?2 AND partner = ?3 AND status != 'aborted'
    ORDER BY date_modified DESC, rowid DESC
    LIMIT 1";

const LOG_NEEDS_ATTENTION_SQL: &str = "SELECT id, entity_type, opportunity_id, partner, action, status,
        entity_external_id, error_reason, retry_count, date_created, date_modified
    FROM processing_log
    WHERE status = 'error'
    ORDER BY date_modified ASC, rowid ASC";

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<ProcessingLog> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(5)?;

    Ok(ProcessingLog {
        entity_type: parse_column(row.get::<_, String>(1)?, 1)?,
        opportunity_id: row.get(2)?,
        partner: parse_column(row.get::<_, String>(3)?, 3)?,
        action: parse_column(row.get::<_, String>(4)?, 4)?,
        status: parse_status(&id, &status_raw),
        entity_external_id: row.get(6)?,
        error_reason: row.get(7)?,
        retry_count: row
            .get::<_, Option<i64>>(8)?
            .map(|count| u32::try_from(count).unwrap_or(u32::MAX)),
        date_created: row.get(9)?,
        date_modified: row.get(10)?,
        id,
    })
}

fn parse_column<T>(raw: String, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        )
    })
}

fn parse_status(id: &str, raw: &str) -> ProcessingStatus {
    match raw.parse::<ProcessingStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                row_id = %id,
                raw_status = %raw,
                error = %err,
                "invalid processing status in store, defaulting to pending"
            );
            ProcessingStatus::Pending
        }
    }
}

fn map_join_error(err: task::JoinError) -> UmbonoError {
    if err.is_cancelled() {
        UmbonoError::Internal("blocking task cancelled".into())
    } else {
        UmbonoError::Internal(format!("blocking task failed: {err}"))
    }
}
