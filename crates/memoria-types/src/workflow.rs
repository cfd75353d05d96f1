//! Durable workflow run records and the workflow error classification.
//!
//! Every workflow run is identified by a string run key derived from its
//! inputs, so a retried or resumed run lands on the same record and the same
//! memoized step results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    Completed,
    Failed,
    /// Suspended by cancellation; may be resumed.
    Aborted,
}

impl WorkflowRunStatus {
    /// Completed and failed runs are never executed again.
    pub fn is_settled(&self) -> bool {
        matches!(self, WorkflowRunStatus::Completed | WorkflowRunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowRunStatus::Running => "running",
            WorkflowRunStatus::Completed => "completed",
            WorkflowRunStatus::Failed => "failed",
            WorkflowRunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for WorkflowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(WorkflowRunStatus::Running),
            "completed" => Ok(WorkflowRunStatus::Completed),
            "failed" => Ok(WorkflowRunStatus::Failed),
            "aborted" => Ok(WorkflowRunStatus::Aborted),
            other => Err(format!("invalid run status: '{other}'")),
        }
    }
}

/// Persisted state of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    pub run_key: String,
    pub workflow_name: String,
    pub status: WorkflowRunStatus,
    /// Input the run was started with; used to resume it.
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRunRecord {
    pub fn running(run_key: &str, workflow_name: &str, input: serde_json::Value) -> Self {
        Self {
            run_key: run_key.to_string(),
            workflow_name: workflow_name.to_string(),
            status: WorkflowRunStatus::Running,
            input,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowError
// ---------------------------------------------------------------------------

/// Outcome classification for a failed step or workflow.
///
/// The runtime matches on this exhaustively: `Abort` is propagated untouched,
/// `Retryable` is retried by the runtime, `Terminal` is never retried and
/// reaches the workflow's failure callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum WorkflowError {
    /// Substrate cancellation. Not a business failure.
    #[error("workflow aborted")]
    Abort,

    #[error("retryable failure: {0}")]
    Retryable(String),

    #[error("terminal failure: {0}")]
    Terminal(String),
}

impl WorkflowError {
    pub fn retryable(message: impl Into<String>) -> Self {
        WorkflowError::Retryable(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        WorkflowError::Terminal(message.into())
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, WorkflowError::Abort)
    }

    /// Collapse everything except `Abort` into a non-retryable failure.
    pub fn into_terminal(self) -> Self {
        match self {
            WorkflowError::Abort => WorkflowError::Abort,
            WorkflowError::Retryable(msg) | WorkflowError::Terminal(msg) => {
                WorkflowError::Terminal(msg)
            }
        }
    }

    /// The underlying failure message (empty for `Abort`).
    pub fn message(&self) -> &str {
        match self {
            WorkflowError::Abort => "",
            WorkflowError::Retryable(msg) | WorkflowError::Terminal(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_terminal_keeps_abort() {
        assert_eq!(WorkflowError::Abort.into_terminal(), WorkflowError::Abort);
    }

    #[test]
    fn test_into_terminal_wraps_retryable() {
        let err = WorkflowError::retryable("provider overloaded").into_terminal();
        assert_eq!(err, WorkflowError::Terminal("provider overloaded".to_string()));
        assert_eq!(err.message(), "provider overloaded");
    }

    #[test]
    fn test_workflow_error_serde_roundtrip() {
        let err = WorkflowError::terminal("bad content");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "terminal");
        let parsed: WorkflowError = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, err);

        let abort: WorkflowError = serde_json::from_str(r#"{"kind":"abort"}"#).unwrap();
        assert!(abort.is_abort());
    }

    #[test]
    fn test_run_status_settled() {
        assert!(WorkflowRunStatus::Completed.is_settled());
        assert!(WorkflowRunStatus::Failed.is_settled());
        assert!(!WorkflowRunStatus::Running.is_settled());
        assert!(!WorkflowRunStatus::Aborted.is_settled());
        assert_eq!("aborted".parse::<WorkflowRunStatus>().unwrap(), WorkflowRunStatus::Aborted);
    }
}
