//! Durable checkpoint storage for workflow runs and memoized steps.

use memoria_types::error::RepositoryError;
use memoria_types::workflow::{WorkflowRunRecord, WorkflowRunStatus};
use serde_json::Value;

/// Storage behind the durable runtime.
///
/// Runs are keyed by their run key; step results by `(run_key, step_key)`.
/// A saved step result is never overwritten: the first write wins.
pub trait CheckpointRepository: Send + Sync {
    fn get_run(
        &self,
        run_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRunRecord>, RepositoryError>> + Send;

    /// Insert the run, or flip an existing unsettled run back to running
    /// (keeping its original `started_at` and input).
    fn upsert_run(
        &self,
        run: &WorkflowRunRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Set status, output, and error. Settled statuses stamp `completed_at`.
    fn update_run_status(
        &self,
        run_key: &str,
        status: WorkflowRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Runs of one workflow in any of the given statuses, oldest first.
    fn list_runs_with_status(
        &self,
        workflow_name: &str,
        statuses: &[WorkflowRunStatus],
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRunRecord>, RepositoryError>> + Send;

    fn load_step(
        &self,
        run_key: &str,
        step_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Value>, RepositoryError>> + Send;

    fn save_step(
        &self,
        run_key: &str,
        step_key: &str,
        output: &Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
