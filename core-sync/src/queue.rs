//! # Durable Task Queue
//!
//! Persistent store of [`SyncTask`]s, keyed by task id. A task written with
//! [`TaskQueue::put`] is visible to [`TaskQueue::get_all`] after a restart.
//!
//! The `sync_tasks` table is created by `core_storage::create_pool` together
//! with the blob table, so both stores share one schema version.

use crate::task::{SyncTask, SyncTaskId, TaskStatus};
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// Repository of sync tasks
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Every task, in creation order.
    async fn get_all(&self) -> Result<Vec<SyncTask>>;

    async fn get(&self, id: &SyncTaskId) -> Result<Option<SyncTask>>;

    /// Insert or replace the task with the same id.
    async fn put(&self, task: &SyncTask) -> Result<()>;

    /// Remove a task. Deleting a missing id is not an error.
    async fn delete(&self, id: &SyncTaskId) -> Result<()>;

    /// Remove the task only while the stored row is still the in-progress
    /// attempt `claimed`. Returns `false` if the session was re-enqueued.
    async fn delete_claimed(&self, claimed: &SyncTask) -> Result<bool>;

    /// Overwrite the stored row with `task` only while it is still the
    /// in-progress attempt `claimed`. Returns `false` if the session was
    /// re-enqueued.
    async fn update_claimed(&self, claimed: &SyncTask, task: &SyncTask) -> Result<bool>;

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<SyncTask>>;

    async fn count_by_status(&self, status: TaskStatus) -> Result<u64> {
        Ok(self.list_by_status(status).await?.len() as u64)
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_progress: u64,
    /// Tasks that spent their retry budget
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.failed
    }

    /// No work left to attempt.
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.in_progress == 0
    }
}

/// SQLite implementation of [`TaskQueue`]
#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, session_id, task_type, status, retry_count, last_attempt,
           next_eligible_at, remote_path, blob_key, content_type, created_at, updated_at
    FROM sync_tasks
"#;

/// Matches a row only while it is the attempt that was claimed: a
/// re-enqueue rewrites the row as `pending` with no `last_attempt`.
const CLAIMED_ROW: &str = r#"
    WHERE id = ? AND created_at = ? AND last_attempt IS ? AND status = 'in_progress'
"#;

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> Result<SyncTask> {
        Ok(SyncTask {
            id: SyncTaskId::from_string(&row.get::<String, _>("id"))?,
            session_id: row.get("session_id"),
            task_type: row.get::<String, _>("task_type").parse()?,
            status: row.get::<String, _>("status").parse()?,
            retry_count: row.get::<i64, _>("retry_count").max(0) as u32,
            last_attempt: row
                .get::<Option<i64>, _>("last_attempt")
                .map(from_millis)
                .transpose()?,
            next_eligible_at: row
                .get::<Option<i64>, _>("next_eligible_at")
                .map(from_millis)
                .transpose()?,
            remote_path: row.get("remote_path"),
            blob_key: row.get("blob_key"),
            content_type: row.get("content_type"),
            created_at: from_millis(row.get("created_at"))?,
            updated_at: from_millis(row.get("updated_at"))?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SyncError::Database(format!("timestamp out of range: {millis}")))
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn get_all(&self) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, id ASC"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn get(&self, id: &SyncTaskId) -> Result<Option<SyncTask>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn put(&self, task: &SyncTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_tasks (
                id, session_id, task_type, status, retry_count, last_attempt,
                next_eligible_at, remote_path, blob_key, content_type, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                session_id = excluded.session_id,
                task_type = excluded.task_type,
                status = excluded.status,
                retry_count = excluded.retry_count,
                last_attempt = excluded.last_attempt,
                next_eligible_at = excluded.next_eligible_at,
                remote_path = excluded.remote_path,
                blob_key = excluded.blob_key,
                content_type = excluded.content_type,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(task.id.as_str())
        .bind(&task.session_id)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(i64::from(task.retry_count))
        .bind(task.last_attempt.map(|t| t.timestamp_millis()))
        .bind(task.next_eligible_at.map(|t| t.timestamp_millis()))
        .bind(&task.remote_path)
        .bind(&task.blob_key)
        .bind(&task.content_type)
        .bind(task.created_at.timestamp_millis())
        .bind(task.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: &SyncTaskId) -> Result<()> {
        sqlx::query("DELETE FROM sync_tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn delete_claimed(&self, claimed: &SyncTask) -> Result<bool> {
        let result = sqlx::query(&format!("DELETE FROM sync_tasks {CLAIMED_ROW}"))
            .bind(claimed.id.as_str())
            .bind(claimed.created_at.timestamp_millis())
            .bind(claimed.last_attempt.map(|t| t.timestamp_millis()))
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_claimed(&self, claimed: &SyncTask, task: &SyncTask) -> Result<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE sync_tasks SET
                status = ?, retry_count = ?, last_attempt = ?,
                next_eligible_at = ?, updated_at = ?
            {CLAIMED_ROW}
            "#
        ))
        .bind(task.status.as_str())
        .bind(i64::from(task.retry_count))
        .bind(task.last_attempt.map(|t| t.timestamp_millis()))
        .bind(task.next_eligible_at.map(|t| t.timestamp_millis()))
        .bind(task.updated_at.timestamp_millis())
        .bind(claimed.id.as_str())
        .bind(claimed.created_at.timestamp_millis())
        .bind(claimed.last_attempt.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<SyncTask>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE status = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn count_by_status(&self, status: TaskStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_tasks WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}
