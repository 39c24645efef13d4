//! Lease-table distributed lock on SQLite.
//!
//! Acquisition is a single atomic upsert: the insert wins when no lease
//! exists, the conflict-update wins only when the existing lease has
//! expired. A crashed holder therefore blocks the job for at most the lease
//! duration instead of deadlocking it forever. Each repository instance has
//! its own owner identity; release only removes a lease this owner holds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::task;
use tracing::{info, warn};
use umbono_core::DistributedLockService;
use umbono_domain::{Result as DomainResult, UmbonoError};
use uuid::Uuid;

use super::manager::{map_sql_error, DbManager};

const LOCK_ACQUIRE_SQL: &str = "INSERT INTO distributed_locks (lock_key, owner, acquired_at, expires_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(lock_key) DO UPDATE SET
        owner = excluded.owner,
        acquired_at = excluded.acquired_at,
        expires_at = excluded.expires_at
    WHERE distributed_locks.expires_at <= ?3";

const LOCK_RELEASE_SQL: &str =
    "DELETE FROM distributed_locks WHERE lock_key = ?1 AND owner = ?2";

/// SQLite-backed distributed lock service.
pub struct SqliteLockRepository {
    db: Arc<DbManager>,
    owner: String,
}

impl SqliteLockRepository {
    /// Construct a lock service with a process-unique owner identity.
    pub fn new(db: Arc<DbManager>) -> Self {
        let owner = format!("{}-{}", std::process::id(), Uuid::new_v4());
        Self { db, owner }
    }

    /// The owner identity used for leases taken by this instance.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn acquire(conn: &Connection, key: &str, owner: &str, duration: Duration) -> DomainResult<bool> {
        let now = Utc::now().timestamp();
        let expires_at =
            now.saturating_add(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX));

        let changed = conn
            .execute(LOCK_ACQUIRE_SQL, params![key, owner, now, expires_at])
            .map_err(map_sql_error)?;
        Ok(changed > 0)
    }
}

#[async_trait]
impl DistributedLockService for SqliteLockRepository {
    async fn try_acquire(&self, key: &str, duration: Duration) -> DomainResult<bool> {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(UmbonoError::InvalidInput("lock key must not be empty".into()));
        }
        if duration.is_zero() {
            return Err(UmbonoError::InvalidInput(
                "lock duration must be greater than zero".into(),
            ));
        }

        let db = Arc::clone(&self.db);
        let owner = self.owner.clone();
        let query_key = key.clone();
        let acquired = task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            Self::acquire(&conn, &query_key, &owner, duration)
        })
        .await
        .map_err(map_join_error)??;

        if acquired {
            info!(
                lock_key = %key,
                owner = %self.owner,
                duration_secs = duration.as_secs(),
                "lock acquired"
            );
        } else {
            info!(lock_key = %key, owner = %self.owner, "lock already held, skipping");
        }

        Ok(acquired)
    }

    async fn release(&self, key: &str) -> DomainResult<()> {
        let key = key.trim().to_string();
        let db = Arc::clone(&self.db);
        let owner = self.owner.clone();
        let query_key = key.clone();

        let result = task::spawn_blocking(move || -> DomainResult<usize> {
            let conn = db.get_connection()?;
            conn.execute(LOCK_RELEASE_SQL, params![query_key, owner]).map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?;

        // Swallow release failures so they never mask an upstream error;
        // an unreleased lease expires on its own.
        match result {
            Ok(_) => {
                info!(lock_key = %key, owner = %self.owner, "lock released");
            }
            Err(err) => {
                warn!(lock_key = %key, owner = %self.owner, error = %err, "failed to release lock, lease will expire");
            }
        }
        Ok(())
    }
}

fn map_join_error(err: task::JoinError) -> UmbonoError {
    if err.is_cancelled() {
        UmbonoError::Internal("blocking task cancelled".into())
    } else {
        UmbonoError::Internal(format!("blocking task failed: {err}"))
    }
}
