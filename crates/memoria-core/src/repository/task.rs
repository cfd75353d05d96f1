//! Async-task ledger repository trait definition.

use memoria_types::error::RepositoryError;
use memoria_types::task::{AsyncTask, AsyncTaskType, TaskErrorKind};
use uuid::Uuid;

/// Result of an atomic create-if-absent on the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateTaskOutcome {
    /// The record was inserted as given.
    Created(AsyncTask),
    /// Another active record for the same user and type already existed.
    Existing(AsyncTask),
}

/// Repository trait for the extraction ledger.
///
/// Implementations must enforce "at most one active task per user and type"
/// at the storage level: several processes may race on `create_task`.
/// Progress and status mutations are single atomic statements; callers never
/// read-modify-write a whole record.
pub trait AsyncTaskRepository: Send + Sync {
    /// Find the pending or processing task for a user, if any.
    fn find_active_task(
        &self,
        user_id: &str,
        task_type: AsyncTaskType,
    ) -> impl std::future::Future<Output = Result<Option<AsyncTask>, RepositoryError>> + Send;

    /// Insert a task unless an active one already exists for the same user
    /// and type. Tasks created in a terminal status never conflict.
    fn create_task(
        &self,
        task: &AsyncTask,
    ) -> impl std::future::Future<Output = Result<CreateTaskOutcome, RepositoryError>> + Send;

    fn get_task(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<AsyncTask>, RepositoryError>> + Send;

    /// Move a pending task to processing. No-op for any other status.
    fn mark_processing(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Add one attempted topic. Moves the task to success once
    /// `completed_topics` reaches `total_topics`. No-op on terminal tasks.
    fn increment_progress(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Move an active task to error. No-op on terminal tasks.
    fn mark_error(
        &self,
        id: &Uuid,
        kind: TaskErrorKind,
        message: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
