//! Hand-off from the extraction gate to the workflow runtime.

use std::sync::Arc;

use memoria_types::extraction::ExtractionRequest;
use memoria_types::workflow::WorkflowError;
use tracing::{error, info};
use uuid::Uuid;

use crate::durable::{DurableRuntime, DurableWorkflow};
use crate::extraction::dispatcher::dispatch_run_key;
use crate::repository::checkpoint::CheckpointRepository;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("workflow runtime is not accepting new runs")]
    Unavailable,

    #[error("dispatch hand-off failed: {0}")]
    Rejected(String),
}

/// Starts the dispatch of a batch whose ledger record already exists.
///
/// Returns once the batch is handed off, not when it finishes. A successful
/// hand-off survives the process exiting before the batch runs.
pub trait BatchScheduler: Send + Sync {
    fn schedule(
        &self,
        request: ExtractionRequest,
        task_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), SchedulerError>> + Send;
}

/// Runs the dispatch workflow on the in-process durable runtime.
pub struct RuntimeScheduler<C: CheckpointRepository, W> {
    runtime: DurableRuntime<C>,
    dispatcher: Arc<W>,
}

impl<C: CheckpointRepository, W> RuntimeScheduler<C, W> {
    pub fn new(runtime: DurableRuntime<C>, dispatcher: Arc<W>) -> Self {
        Self { runtime, dispatcher }
    }
}

impl<C, W> BatchScheduler for RuntimeScheduler<C, W>
where
    C: CheckpointRepository + 'static,
    W: DurableWorkflow<Input = ExtractionRequest>,
{
    async fn schedule(&self, mut request: ExtractionRequest, task_id: Uuid) -> Result<(), SchedulerError> {
        if self.runtime.is_shut_down() {
            return Err(SchedulerError::Unavailable);
        }

        request.async_task_id = Some(task_id);
        let run_key = dispatch_run_key(&task_id);

        // Resumable from here on, even if the spawned task never gets polled.
        self.runtime
            .checkpoints()
            .begin_run(&run_key, W::NAME, &request)
            .await
            .map_err(|e| SchedulerError::Rejected(e.to_string()))?;

        let runtime = self.runtime.clone();
        let dispatcher = Arc::clone(&self.dispatcher);

        info!(%task_id, run_key, "scheduling memory extraction dispatch");
        tokio::spawn(async move {
            match runtime.start(dispatcher.as_ref(), &run_key, request).await {
                Ok(_) => info!(run_key, "dispatch finished"),
                Err(WorkflowError::Abort) => info!(run_key, "dispatch suspended"),
                Err(e) => error!(run_key, error = %e, "dispatch failed"),
            }
        });

        Ok(())
    }
}
