//! Process-local checkpoint storage.
//!
//! Gives the runtime memoization and idempotent invocation within one
//! process lifetime. Nothing survives a restart; use the SQLite repository
//! for that.

use chrono::Utc;
use dashmap::DashMap;
use memoria_types::error::RepositoryError;
use memoria_types::workflow::{WorkflowRunRecord, WorkflowRunStatus};
use serde_json::Value;

use crate::repository::checkpoint::CheckpointRepository;

#[derive(Debug, Default)]
pub struct InMemoryCheckpointRepository {
    runs: DashMap<String, WorkflowRunRecord>,
    steps: DashMap<(String, String), Value>,
}

impl InMemoryCheckpointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of memoized steps across all runs.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn get_run(&self, run_key: &str) -> Result<Option<WorkflowRunRecord>, RepositoryError> {
        Ok(self.runs.get(run_key).map(|r| r.value().clone()))
    }

    async fn upsert_run(&self, run: &WorkflowRunRecord) -> Result<(), RepositoryError> {
        self.runs
            .entry(run.run_key.clone())
            .and_modify(|existing| {
                if !existing.status.is_settled() {
                    existing.status = WorkflowRunStatus::Running;
                    existing.error = None;
                }
            })
            .or_insert_with(|| run.clone());
        Ok(())
    }

    async fn update_run_status(
        &self,
        run_key: &str,
        status: WorkflowRunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut run = self.runs.get_mut(run_key).ok_or(RepositoryError::NotFound)?;
        run.status = status;
        run.output = output.cloned();
        run.error = error.map(str::to_string);
        if status.is_settled() {
            run.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_runs_with_status(
        &self,
        workflow_name: &str,
        statuses: &[WorkflowRunStatus],
    ) -> Result<Vec<WorkflowRunRecord>, RepositoryError> {
        let mut runs: Vec<WorkflowRunRecord> = self
            .runs
            .iter()
            .filter(|r| r.workflow_name == workflow_name && statuses.contains(&r.status))
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    async fn load_step(&self, run_key: &str, step_key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .steps
            .get(&(run_key.to_string(), step_key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn save_step(&self, run_key: &str, step_key: &str, output: &Value) -> Result<(), RepositoryError> {
        self.steps
            .entry((run_key.to_string(), step_key.to_string()))
            .or_insert_with(|| output.clone());
        Ok(())
    }
}
