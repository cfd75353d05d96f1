//! Async-task ledger record tracking one extraction batch.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::UserId;
use crate::extraction::SourceKind;

/// Kind of batch a ledger record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AsyncTaskType {
    UserMemoryExtraction,
}

impl AsyncTaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncTaskType::UserMemoryExtraction => "user-memory-extraction",
        }
    }
}

impl FromStr for AsyncTaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user-memory-extraction" => Ok(AsyncTaskType::UserMemoryExtraction),
            other => Err(format!("invalid task type: '{other}'")),
        }
    }
}

/// Ledger status. Transitions are monotonic: pending -> processing ->
/// success | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncTaskStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl AsyncTaskStatus {
    /// Active tasks block new batches for the same user.
    pub fn is_active(&self) -> bool {
        matches!(self, AsyncTaskStatus::Pending | AsyncTaskStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncTaskStatus::Pending => "pending",
            AsyncTaskStatus::Processing => "processing",
            AsyncTaskStatus::Success => "success",
            AsyncTaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for AsyncTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AsyncTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AsyncTaskStatus::Pending),
            "processing" => Ok(AsyncTaskStatus::Processing),
            "success" => Ok(AsyncTaskStatus::Success),
            "error" => Ok(AsyncTaskStatus::Error),
            other => Err(format!("invalid task status: '{other}'")),
        }
    }
}

/// Topics attempted versus topics in the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub completed_topics: u32,
    pub total_topics: u32,
}

impl TaskProgress {
    pub fn is_complete(&self) -> bool {
        self.completed_topics >= self.total_topics
    }
}

/// Date range the batch was requested for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub progress: TaskProgress,
    pub range: DateRange,
    pub source: SourceKind,
}

/// Why a ledger record ended in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// The batch could not be handed off to the workflow runtime.
    TaskTriggerError,
    /// The dispatch workflow itself could not run.
    DispatchError,
}

impl TaskErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskErrorKind::TaskTriggerError => "TaskTriggerError",
            TaskErrorKind::DispatchError => "DispatchError",
        }
    }
}

impl FromStr for TaskErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TaskTriggerError" => Ok(TaskErrorKind::TaskTriggerError),
            "DispatchError" => Ok(TaskErrorKind::DispatchError),
            other => Err(format!("invalid task error kind: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

/// Durable record of one extraction batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTask {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub task_type: AsyncTaskType,
    pub status: AsyncTaskStatus,
    pub metadata: TaskMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AsyncTask {
    /// Build a new user-memory-extraction record.
    ///
    /// A batch with no topics starts (and ends) in `Success`.
    pub fn new_extraction(
        user_id: impl Into<UserId>,
        range: DateRange,
        source: SourceKind,
        total_topics: u32,
    ) -> Self {
        let now = Utc::now();
        let status = if total_topics == 0 {
            AsyncTaskStatus::Success
        } else {
            AsyncTaskStatus::Pending
        };
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.into(),
            task_type: AsyncTaskType::UserMemoryExtraction,
            status,
            metadata: TaskMetadata {
                progress: TaskProgress {
                    completed_topics: 0,
                    total_topics,
                },
                range,
                source,
            },
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
