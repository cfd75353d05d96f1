//! Durable checkpoint manager for workflow runs.
//!
//! Wraps `CheckpointRepository` to provide the higher-level operations the
//! runtime needs: begin/settle a run, and memoize step results as JSON. Every
//! transition is persisted before the runtime moves forward, so a run resumed
//! on another process replays only the steps that never completed.

use memoria_types::workflow::{WorkflowError, WorkflowRunRecord, WorkflowRunStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::repository::checkpoint::CheckpointRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for workflow runs.
///
/// Generic over `R: CheckpointRepository` so it works with any storage backend
/// (SQLite, in-memory, etc.).
pub struct CheckpointManager<R: CheckpointRepository> {
    repo: R,
}

impl<R: CheckpointRepository> CheckpointManager<R> {
    /// Create a new checkpoint manager backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    pub async fn get_run(&self, run_key: &str) -> Result<Option<WorkflowRunRecord>, CheckpointError> {
        self.repo
            .get_run(run_key)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Record a run as running with its input (insert or resume).
    pub async fn begin_run<I: Serialize>(
        &self,
        run_key: &str,
        workflow_name: &str,
        input: &I,
    ) -> Result<(), CheckpointError> {
        let input = serde_json::to_value(input)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        let record = WorkflowRunRecord::running(run_key, workflow_name, input);

        self.repo
            .upsert_run(&record)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_key, workflow = workflow_name, "checkpointed run start");
        Ok(())
    }

    pub async fn complete_run<O: Serialize>(&self, run_key: &str, output: &O) -> Result<(), CheckpointError> {
        let output = serde_json::to_value(output)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        self.settle(run_key, WorkflowRunStatus::Completed, Some(&output), None)
            .await
    }

    pub async fn fail_run(&self, run_key: &str, error: &str) -> Result<(), CheckpointError> {
        self.settle(run_key, WorkflowRunStatus::Failed, None, Some(error))
            .await
    }

    pub async fn abort_run(&self, run_key: &str) -> Result<(), CheckpointError> {
        self.settle(run_key, WorkflowRunStatus::Aborted, None, None)
            .await
    }

    async fn settle(
        &self,
        run_key: &str,
        status: WorkflowRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_run_status(run_key, status, output, error)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_key, status = %status, "checkpointed run status");
        Ok(())
    }

    /// Runs of a workflow left running or aborted (crash recovery).
    pub async fn incomplete_runs(&self, workflow_name: &str) -> Result<Vec<WorkflowRunRecord>, CheckpointError> {
        self.repo
            .list_runs_with_status(
                workflow_name,
                &[WorkflowRunStatus::Running, WorkflowRunStatus::Aborted],
            )
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Load a memoized step result, if the step already completed.
    pub async fn load_step<T: DeserializeOwned>(
        &self,
        run_key: &str,
        step_key: &str,
    ) -> Result<Option<T>, CheckpointError> {
        let stored = self
            .repo
            .load_step(run_key, step_key)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        stored
            .map(|value| {
                serde_json::from_value(value).map_err(|e| CheckpointError::Serialization(e.to_string()))
            })
            .transpose()
    }

    pub async fn save_step<T: Serialize>(
        &self,
        run_key: &str,
        step_key: &str,
        output: &T,
    ) -> Result<(), CheckpointError> {
        let value = serde_json::to_value(output)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;

        self.repo
            .save_step(run_key, step_key, &value)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(run_key, step_key, "checkpointed step result");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// A step result or run input could not be (de)serialized.
    #[error("checkpoint serialization error: {0}")]
    Serialization(String),
}

impl From<CheckpointError> for WorkflowError {
    /// Storage hiccups are worth retrying; a payload that does not
    /// deserialize never will be.
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Repository(_) => WorkflowError::Retryable(err.to_string()),
            CheckpointError::Serialization(_) => WorkflowError::Terminal(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
