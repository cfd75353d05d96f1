//! SQLite extraction ledger implementation.
//!
//! Implements `AsyncTaskRepository` from `memoria-core`. The
//! single-active-task-per-user rule is a partial unique index, so concurrent
//! processes racing on `create_task` resolve in the database. Progress and
//! status changes are single `UPDATE` statements guarded on the current
//! status; nothing here reads a row and writes it back.

use chrono::Utc;
use memoria_core::repository::task::{AsyncTaskRepository, CreateTaskOutcome};
use memoria_types::error::RepositoryError;
use memoria_types::extraction::SourceKind;
use memoria_types::task::{
    AsyncTask, AsyncTaskStatus, AsyncTaskType, DateRange, TaskError, TaskErrorKind, TaskMetadata,
    TaskProgress,
};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

const TASK_COLUMNS: &str = "id, user_id, task_type, status, completed_topics, total_topics, \
     range_from, range_to, source, error_kind, error_message, created_at, updated_at";

/// SQLite-backed implementation of `AsyncTaskRepository`.
pub struct SqliteTaskRepository {
    pool: DatabasePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct TaskRow {
    id: String,
    user_id: String,
    task_type: String,
    status: String,
    completed_topics: i64,
    total_topics: i64,
    range_from: Option<String>,
    range_to: Option<String>,
    source: String,
    error_kind: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            task_type: row.try_get("task_type")?,
            status: row.try_get("status")?,
            completed_topics: row.try_get("completed_topics")?,
            total_topics: row.try_get("total_topics")?,
            range_from: row.try_get("range_from")?,
            range_to: row.try_get("range_to")?,
            source: row.try_get("source")?,
            error_kind: row.try_get("error_kind")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_task(self) -> Result<AsyncTask, RepositoryError> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))?;
        let task_type: AsyncTaskType = self.task_type.parse().map_err(RepositoryError::Query)?;
        let status: AsyncTaskStatus = self.status.parse().map_err(RepositoryError::Query)?;

        let error = match self.error_kind {
            Some(kind) => Some(TaskError {
                kind: kind.parse::<TaskErrorKind>().map_err(RepositoryError::Query)?,
                message: self.error_message.unwrap_or_default(),
            }),
            None => None,
        };

        Ok(AsyncTask {
            id,
            user_id: self.user_id,
            task_type,
            status,
            metadata: TaskMetadata {
                progress: TaskProgress {
                    completed_topics: self.completed_topics as u32,
                    total_topics: self.total_topics as u32,
                },
                range: DateRange {
                    from: self.range_from.as_deref().map(parse_datetime).transpose()?,
                    to: self.range_to.as_deref().map(parse_datetime).transpose()?,
                },
                source: SourceKind::from(self.source),
            },
            error,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// AsyncTaskRepository impl
// ---------------------------------------------------------------------------

impl AsyncTaskRepository for SqliteTaskRepository {
    async fn find_active_task(
        &self,
        user_id: &str,
        task_type: AsyncTaskType,
    ) -> Result<Option<AsyncTask>, RepositoryError> {
        // Read through the writer so a just-lost creation race sees the winner.
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM async_tasks \
             WHERE user_id = ? AND task_type = ? AND status IN ('pending', 'processing')"
        ))
        .bind(user_id)
        .bind(task_type.as_str())
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(query_error)?;

        row.map(|r| TaskRow::from_row(&r).map_err(query_error)?.into_task())
            .transpose()
    }

    async fn create_task(&self, task: &AsyncTask) -> Result<CreateTaskOutcome, RepositoryError> {
        let progress = task.metadata.progress;
        let result = sqlx::query(
            r#"INSERT INTO async_tasks
               (id, user_id, task_type, status, completed_topics, total_topics,
                range_from, range_to, source, error_kind, error_message, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(task.id.to_string())
        .bind(&task.user_id)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(progress.completed_topics as i64)
        .bind(progress.total_topics as i64)
        .bind(task.metadata.range.from.as_ref().map(format_datetime))
        .bind(task.metadata.range.to.as_ref().map(format_datetime))
        .bind(task.metadata.source.as_str())
        .bind(task.error.as_ref().map(|e| e.kind.as_str()))
        .bind(task.error.as_ref().map(|e| e.message.as_str()))
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 1 {
            return Ok(CreateTaskOutcome::Created(task.clone()));
        }

        match self.find_active_task(&task.user_id, task.task_type).await? {
            Some(existing) => Ok(CreateTaskOutcome::Existing(existing)),
            None => Err(RepositoryError::Conflict(format!(
                "task {} conflicted but no active task exists",
                task.id
            ))),
        }
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<AsyncTask>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM async_tasks WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_error)?;

        row.map(|r| TaskRow::from_row(&r).map_err(query_error)?.into_task())
            .transpose()
    }

    async fn mark_processing(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE async_tasks SET status = 'processing', updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn increment_progress(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"UPDATE async_tasks SET
                 completed_topics = completed_topics + 1,
                 status = CASE WHEN completed_topics + 1 >= total_topics
                               THEN 'success' ELSE 'processing' END,
                 updated_at = ?
               WHERE id = ? AND status IN ('pending', 'processing')"#,
        )
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }

    async fn mark_error(&self, id: &Uuid, kind: TaskErrorKind, message: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE async_tasks SET status = 'error', error_kind = ?, error_message = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(kind.as_str())
        .bind(message)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}
