//! Per-topic extraction job.
//!
//! Runs as a nested durable workflow, one per topic of a batch, in two
//! strictly ordered phases: the CEPA layers first, then identity, which reads
//! whatever the first phase persisted. Each phase is one extractor call and
//! one memoized step.

use std::sync::Arc;

use memoria_types::error::RepositoryError;
use memoria_types::extraction::PerTopicJob;
use memoria_types::memory::{PARALLEL_GROUP, SEQUENTIAL_GROUP, filter_layers, join_layers};
use memoria_types::workflow::WorkflowError;
use tracing::{Instrument, debug, info_span, warn};

use crate::durable::{DurableWorkflow, StepContext};
use crate::extraction::collaborator::{TopicExtractionParams, TopicExtractor};
use crate::repository::checkpoint::CheckpointRepository;
use crate::repository::task::AsyncTaskRepository;

pub const TOPIC_WORKFLOW_NAME: &str = "memory-extraction.process-topic";

const STEP_PARALLEL_LAYERS: &str = "extract-parallel-layers";
const STEP_IDENTITY_LAYER: &str = "extract-identity-layer";
const STEP_REPORT_PROGRESS: &str = "report-progress";

/// Ledger failures are storage hiccups; the step policy retries them.
pub(crate) fn ledger_error(err: RepositoryError) -> WorkflowError {
    WorkflowError::retryable(format!("ledger: {err}"))
}

pub struct TopicExtractionWorkflow<L, E> {
    ledger: Arc<L>,
    extractor: Arc<E>,
}

impl<L, E> TopicExtractionWorkflow<L, E>
where
    L: AsyncTaskRepository + 'static,
    E: TopicExtractor + 'static,
{
    pub fn new(ledger: Arc<L>, extractor: Arc<E>) -> Self {
        Self { ledger, extractor }
    }

    async fn run_phases<C: CheckpointRepository + 'static>(
        &self,
        ctx: &StepContext<C>,
        job: &PerTopicJob,
    ) -> Result<(), WorkflowError> {
        let extractor = self.extractor.as_ref();

        let parallel = TopicExtractionParams::for_job(job, filter_layers(&job.layers, &PARALLEL_GROUP));
        debug!(layers = %join_layers(&parallel.layers), "extracting parallel layer group");
        let parallel = &parallel;
        ctx.run_step(STEP_PARALLEL_LAYERS, || async move {
            extractor.extract_topic(parallel).await.map_err(WorkflowError::from)
        })
        .await?;

        // Runs even when the identity layer was excluded; the extractor
        // no-ops on an empty layer list.
        let identity = TopicExtractionParams::for_job(job, filter_layers(&job.layers, &SEQUENTIAL_GROUP));
        debug!(layers = %join_layers(&identity.layers), "extracting identity layer group");
        let identity = &identity;
        ctx.run_step(STEP_IDENTITY_LAYER, || async move {
            extractor.extract_topic(identity).await.map_err(WorkflowError::from)
        })
        .await?;

        if let Some(task_id) = job.async_task_id {
            let ledger = self.ledger.as_ref();
            ctx.run_step(STEP_REPORT_PROGRESS, || async move {
                ledger.increment_progress(&task_id).await.map_err(ledger_error)
            })
            .await?;
        }

        Ok(())
    }
}

impl<L, E> DurableWorkflow for TopicExtractionWorkflow<L, E>
where
    L: AsyncTaskRepository + 'static,
    E: TopicExtractor + 'static,
{
    type Input = PerTopicJob;
    type Output = ();
    const NAME: &'static str = TOPIC_WORKFLOW_NAME;

    /// Anything but an abort leaves the job as a terminal failure, so a topic
    /// that fails systematically gets exactly one job-level attempt.
    async fn run<C: CheckpointRepository + 'static>(
        &self,
        ctx: &StepContext<C>,
        job: PerTopicJob,
    ) -> Result<(), WorkflowError> {
        let span = info_span!(
            "memory_extraction.process_topic",
            memory_extraction.user_id = %job.user_id,
            memory_extraction.topic_id = %job.topic_id,
        );
        self.run_phases(ctx, &job)
            .instrument(span)
            .await
            .map_err(WorkflowError::into_terminal)
    }

    /// A failed topic still counts as attempted.
    async fn on_failure(&self, job: &PerTopicJob, error: &WorkflowError) {
        warn!(
            user_id = %job.user_id,
            topic_id = %job.topic_id,
            error = %error,
            "topic extraction failed"
        );

        if let Some(task_id) = job.async_task_id {
            if let Err(e) = self.ledger.increment_progress(&task_id).await {
                warn!(%task_id, error = %e, "failed to record progress for failed topic");
            }
        }
    }
}
