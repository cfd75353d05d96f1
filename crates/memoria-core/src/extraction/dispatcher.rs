//! Batch dispatcher: the root workflow of one extraction batch.
//!
//! Resolves the batch's user and topics, fans out one per-topic job per topic
//! under a shared flow-control cap, waits for every job to settle, then
//! triggers persona recomposition once. Per-topic failures are absorbed by
//! the topic workflow's failure callback and never fail the batch.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;
use memoria_types::config::ExtractionConfig;
use memoria_types::extraction::{DispatchOutcome, ExtractionRequest, PerTopicJob, SourceKind};
use memoria_types::memory::join_layers;
use memoria_types::task::TaskErrorKind;
use memoria_types::workflow::WorkflowError;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::durable::{DurableWorkflow, InvokeOptions, InvokeOutcome, StepContext};
use crate::extraction::collaborator::{PersonaTrigger, PersonaUpdateOptions, TopicExtractor};
use crate::extraction::topic_job::{TopicExtractionWorkflow, ledger_error};
use crate::repository::checkpoint::CheckpointRepository;
use crate::repository::task::AsyncTaskRepository;

pub const DISPATCH_WORKFLOW_NAME: &str = "memory-extraction.dispatch";

const STEP_MARK_PROCESSING: &str = "mark-processing";
const STEP_TRIGGER_PERSONA: &str = "trigger-persona-update";

/// Root run key of the dispatch for a ledger task.
pub fn dispatch_run_key(task_id: &Uuid) -> String {
    format!("memory-extraction:{task_id}")
}

/// Flow-control key shared by every topic job of a user's batch. The cap is
/// per user across all of that user's topics, not per (user, topic).
pub fn flow_control_key(user_id: &str) -> String {
    format!("memory-extraction:{user_id}")
}

pub struct BatchDispatcher<L, E, P> {
    ledger: Arc<L>,
    topic_workflow: TopicExtractionWorkflow<L, E>,
    persona: Arc<P>,
    supported_source: SourceKind,
    parallelism_cap: u32,
}

impl<L, E, P> BatchDispatcher<L, E, P>
where
    L: AsyncTaskRepository + 'static,
    E: TopicExtractor + 'static,
    P: PersonaTrigger + 'static,
{
    pub fn new(ledger: Arc<L>, extractor: Arc<E>, persona: Arc<P>, config: &ExtractionConfig) -> Self {
        Self {
            topic_workflow: TopicExtractionWorkflow::new(Arc::clone(&ledger), extractor),
            ledger,
            persona,
            supported_source: SourceKind::from(config.supported_source.as_str()),
            parallelism_cap: config.effective_parallelism(),
        }
    }

    pub fn topic_workflow(&self) -> &TopicExtractionWorkflow<L, E> {
        &self.topic_workflow
    }

    async fn dispatch<C: CheckpointRepository + 'static>(
        &self,
        ctx: &StepContext<C>,
        req: ExtractionRequest,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let Some(user_id) = req.primary_user().cloned() else {
            info!("no user for batch");
            return Ok(DispatchOutcome::default());
        };
        if req.topic_ids.is_empty() {
            info!(%user_id, "no topics for extraction");
            return Ok(DispatchOutcome::default());
        }
        if !req.sources.contains(&self.supported_source) {
            info!(%user_id, "source not supported");
            return Ok(DispatchOutcome::default());
        }

        if let Some(task_id) = req.async_task_id {
            let ledger = self.ledger.as_ref();
            ctx.run_step(STEP_MARK_PROCESSING, || async move {
                ledger.mark_processing(&task_id).await.map_err(ledger_error)
            })
            .await?;
        }

        // Duplicate topic ids would map onto the same child run.
        let mut seen = BTreeSet::new();
        let jobs: Vec<PerTopicJob> = req
            .topic_ids
            .iter()
            .filter(|topic_id| seen.insert(topic_id.as_str()))
            .map(|topic_id| PerTopicJob::from_request(&req, &user_id, topic_id, self.supported_source.clone()))
            .collect();
        let topic_count = jobs.len() as u32;

        let options = InvokeOptions {
            flow_control_key: flow_control_key(&user_id),
            flow_control_limit: self.parallelism_cap,
        };
        let options = &options;
        let topic_workflow = &self.topic_workflow;
        let invocations = jobs.into_iter().map(|job| async move {
            let key = job.invoke_key();
            ctx.invoke(&key, options, topic_workflow, job).await
        });

        let mut failed = 0u32;
        for outcome in join_all(invocations).await {
            if let InvokeOutcome::Failed(_) = outcome? {
                failed += 1;
            }
        }
        info!(%user_id, topics = topic_count, failed, "all topic jobs settled");

        let persona_options = PersonaUpdateOptions {
            async_task_id: req.async_task_id,
            topic_count,
            user_initiated: req.user_initiated,
        };
        let persona = self.persona.as_ref();
        let (user, base_url, persona_options) = (user_id.as_str(), req.base_url.as_str(), &persona_options);
        let triggered = ctx
            .run_step(STEP_TRIGGER_PERSONA, || async move {
                persona
                    .trigger_persona_update(user, base_url, persona_options)
                    .await
                    .map_err(WorkflowError::from)
            })
            .await;

        match triggered {
            Ok(()) => {}
            Err(WorkflowError::Abort) => return Err(WorkflowError::Abort),
            Err(e) => warn!(%user_id, error = %e, "persona update failed; batch result unaffected"),
        }

        Ok(DispatchOutcome {
            processed_topics: topic_count,
            processed_users: 1,
        })
    }
}

impl<L, E, P> DurableWorkflow for BatchDispatcher<L, E, P>
where
    L: AsyncTaskRepository + 'static,
    E: TopicExtractor + 'static,
    P: PersonaTrigger + 'static,
{
    type Input = ExtractionRequest;
    type Output = DispatchOutcome;
    const NAME: &'static str = DISPATCH_WORKFLOW_NAME;

    async fn run<C: CheckpointRepository + 'static>(
        &self,
        ctx: &StepContext<C>,
        req: ExtractionRequest,
    ) -> Result<DispatchOutcome, WorkflowError> {
        let sources = req
            .sources
            .iter()
            .map(SourceKind::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let span = info_span!(
            "memory_extraction.dispatch",
            memory_extraction.task_id = ?req.async_task_id,
            memory_extraction.topic_count = req.topic_ids.len(),
            memory_extraction.user_count = req.user_ids.len(),
            memory_extraction.layers = %join_layers(&req.effective_layers()),
            memory_extraction.source = %sources,
        );
        self.dispatch(ctx, req).instrument(span).await
    }

    async fn on_failure(&self, req: &ExtractionRequest, error: &WorkflowError) {
        error!(task_id = ?req.async_task_id, error = %error, "memory extraction dispatch failed");

        if let Some(task_id) = req.async_task_id {
            if let Err(e) = self
                .ledger
                .mark_error(&task_id, TaskErrorKind::DispatchError, error.message())
                .await
            {
                warn!(%task_id, error = %e, "failed to record dispatch failure");
            }
        }
    }
}
