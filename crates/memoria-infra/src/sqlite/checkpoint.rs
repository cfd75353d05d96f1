//! SQLite checkpoint repository implementation.
//!
//! Implements `CheckpointRepository` from `memoria-core` using sqlx with split
//! read/write pools. Run inputs, outputs and step results are stored as JSON
//! text. Runs survive a process restart so the durable runtime can resume
//! them; step rows are the memo table.

use chrono::Utc;
use memoria_core::repository::checkpoint::CheckpointRepository;
use memoria_types::error::RepositoryError;
use memoria_types::workflow::{WorkflowRunRecord, WorkflowRunStatus};
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, query_error};

/// SQLite-backed implementation of `CheckpointRepository`.
pub struct SqliteCheckpointRepository {
    pool: DatabasePool,
}

impl SqliteCheckpointRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn json_error(e: serde_json::Error) -> RepositoryError {
    RepositoryError::Query(format!("invalid JSON: {e}"))
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

struct RunRow {
    run_key: String,
    workflow_name: String,
    status: String,
    input: String,
    output: Option<String>,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_key: row.try_get("run_key")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<WorkflowRunRecord, RepositoryError> {
        Ok(WorkflowRunRecord {
            run_key: self.run_key,
            workflow_name: self.workflow_name,
            status: self.status.parse().map_err(RepositoryError::Query)?,
            input: serde_json::from_str(&self.input).map_err(json_error)?,
            output: self
                .output
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(json_error)?,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

const RUN_COLUMNS: &str =
    "run_key, workflow_name, status, input, output, error, started_at, completed_at";

// ---------------------------------------------------------------------------
// CheckpointRepository impl
// ---------------------------------------------------------------------------

impl CheckpointRepository for SqliteCheckpointRepository {
    async fn get_run(&self, run_key: &str) -> Result<Option<WorkflowRunRecord>, RepositoryError> {
        // The runtime reads back what it just wrote; go through the writer.
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE run_key = ?"))
            .bind(run_key)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => Ok(Some(RunRow::from_row(&row).map_err(query_error)?.into_record()?)),
            None => Ok(None),
        }
    }

    async fn upsert_run(&self, run: &WorkflowRunRecord) -> Result<(), RepositoryError> {
        let input = serde_json::to_string(&run.input).map_err(json_error)?;

        sqlx::query(
            r#"INSERT INTO workflow_runs
               (run_key, workflow_name, status, input, output, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, NULL, NULL, ?, NULL)
               ON CONFLICT(run_key) DO UPDATE SET
                 status = 'running',
                 error = NULL
               WHERE workflow_runs.status NOT IN ('completed', 'failed')"#,
        )
        .bind(&run.run_key)
        .bind(&run.workflow_name)
        .bind(run.status.as_str())
        .bind(input)
        .bind(format_datetime(&run.started_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn update_run_status(
        &self,
        run_key: &str,
        status: WorkflowRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output = output
            .map(serde_json::to_string)
            .transpose()
            .map_err(json_error)?;
        let completed_at = status.is_settled().then(|| format_datetime(&Utc::now()));

        let result = sqlx::query(
            "UPDATE workflow_runs SET status = ?, output = ?, error = ?, completed_at = ? \
             WHERE run_key = ?",
        )
        .bind(status.as_str())
        .bind(output)
        .bind(error)
        .bind(completed_at)
        .bind(run_key)
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_runs_with_status(
        &self,
        workflow_name: &str,
        statuses: &[WorkflowRunStatus],
    ) -> Result<Vec<WorkflowRunRecord>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs \
             WHERE workflow_name = ? AND status IN ({placeholders}) \
             ORDER BY started_at ASC, run_key ASC"
        );

        let mut query = sqlx::query(&sql).bind(workflow_name);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| RunRow::from_row(row).map_err(query_error)?.into_record())
            .collect()
    }

    async fn load_step(&self, run_key: &str, step_key: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query("SELECT output FROM workflow_steps WHERE run_key = ? AND step_key = ?")
            .bind(run_key)
            .bind(step_key)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_error)?;

        match row {
            Some(row) => {
                let output: String = row.try_get("output").map_err(query_error)?;
                Ok(Some(serde_json::from_str(&output).map_err(json_error)?))
            }
            None => Ok(None),
        }
    }

    async fn save_step(&self, run_key: &str, step_key: &str, output: &Value) -> Result<(), RepositoryError> {
        let output = serde_json::to_string(output).map_err(json_error)?;

        sqlx::query(
            "INSERT INTO workflow_steps (run_key, step_key, output, completed_at) \
             VALUES (?, ?, ?, ?) ON CONFLICT(run_key, step_key) DO NOTHING",
        )
        .bind(run_key)
        .bind(step_key)
        .bind(output)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_pool;
    use serde_json::json;

    async fn repo() -> (SqliteCheckpointRepository, tempfile::TempDir) {
        let (pool, dir) = test_pool().await;
        (SqliteCheckpointRepository::new(pool), dir)
    }

    #[tokio::test]
    async fn upsert_and_get_run() {
        let (repo, _dir) = repo().await;
        let run = WorkflowRunRecord::running("k1", "wf", json!({"userIds": ["u1"]}));
        repo.upsert_run(&run).await.unwrap();

        let stored = repo.get_run("k1").await.unwrap().unwrap();
        assert_eq!(stored.workflow_name, "wf");
        assert_eq!(stored.status, WorkflowRunStatus::Running);
        assert_eq!(stored.input["userIds"][0], "u1");
        assert!(stored.output.is_none());
        assert!(stored.completed_at.is_none());
        assert!(repo.get_run("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_resumes_aborted_run_keeping_input() {
        let (repo, _dir) = repo().await;
        repo.upsert_run(&WorkflowRunRecord::running("k1", "wf", json!(1)))
            .await
            .unwrap();
        repo.update_run_status("k1", WorkflowRunStatus::Aborted, None, Some("cancelled"))
            .await
            .unwrap();

        repo.upsert_run(&WorkflowRunRecord::running("k1", "wf", json!(2)))
            .await
            .unwrap();

        let stored = repo.get_run("k1").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowRunStatus::Running);
        assert_eq!(stored.input, json!(1));
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn upsert_never_reopens_settled_run() {
        let (repo, _dir) = repo().await;
        repo.upsert_run(&WorkflowRunRecord::running("k1", "wf", json!(null)))
            .await
            .unwrap();
        repo.update_run_status("k1", WorkflowRunStatus::Completed, Some(&json!({"n": 3})), None)
            .await
            .unwrap();

        repo.upsert_run(&WorkflowRunRecord::running("k1", "wf", json!(null)))
            .await
            .unwrap();

        let stored = repo.get_run("k1").await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowRunStatus::Completed);
        assert_eq!(stored.output, Some(json!({"n": 3})));
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn update_unknown_run_is_not_found() {
        let (repo, _dir) = repo().await;
        let err = repo
            .update_run_status("nope", WorkflowRunStatus::Failed, None, Some("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn list_runs_filters_by_name_and_status() {
        let (repo, _dir) = repo().await;
        for (key, name) in [("a", "wf"), ("b", "wf"), ("c", "other"), ("d", "wf")] {
            repo.upsert_run(&WorkflowRunRecord::running(key, name, json!(key)))
                .await
                .unwrap();
        }
        repo.update_run_status("b", WorkflowRunStatus::Completed, None, None)
            .await
            .unwrap();
        repo.update_run_status("d", WorkflowRunStatus::Aborted, None, None)
            .await
            .unwrap();

        let runs = repo
            .list_runs_with_status("wf", &[WorkflowRunStatus::Running, WorkflowRunStatus::Aborted])
            .await
            .unwrap();
        let mut keys: Vec<_> = runs.iter().map(|r| r.run_key.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "d"]);

        assert!(repo.list_runs_with_status("wf", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn first_step_write_wins() {
        let (repo, _dir) = repo().await;
        repo.upsert_run(&WorkflowRunRecord::running("k1", "wf", json!(null)))
            .await
            .unwrap();

        assert!(repo.load_step("k1", "s").await.unwrap().is_none());
        repo.save_step("k1", "s", &json!("first")).await.unwrap();
        repo.save_step("k1", "s", &json!("second")).await.unwrap();
        assert_eq!(repo.load_step("k1", "s").await.unwrap(), Some(json!("first")));
    }

    #[tokio::test]
    async fn step_requires_existing_run() {
        let (repo, _dir) = repo().await;
        let err = repo.save_step("ghost", "s", &json!(1)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)));
    }
}
