//! Extraction gate: the single entry point that turns a trigger into a
//! ledger record and, at most once per user at a time, a scheduled batch.

use std::sync::Arc;

use memoria_types::config::GlobalConfig;
use memoria_types::error::{RepositoryError, ValidationError};
use memoria_types::extraction::{ExtractionRequest, ExtractionTicket, SourceKind};
use memoria_types::task::{AsyncTask, AsyncTaskType, DateRange, TaskErrorKind};
use memoria_types::{TopicId, UserId};
use tracing::{error, info};
use uuid::Uuid;

use crate::extraction::scheduler::BatchScheduler;
use crate::repository::task::{AsyncTaskRepository, CreateTaskOutcome};
use crate::repository::topic::{TopicQuery, TopicRepository};

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The ledger record exists (now in `Error`) but the batch never started.
    #[error("failed to schedule extraction task {task_id}: {message}")]
    Scheduling { task_id: Uuid, message: String },

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct ExtractionService<L, T, S> {
    ledger: Arc<L>,
    topics: Arc<T>,
    scheduler: S,
    supported_source: SourceKind,
    default_base_url: String,
}

impl<L, T, S> ExtractionService<L, T, S>
where
    L: AsyncTaskRepository,
    T: TopicRepository,
    S: BatchScheduler,
{
    pub fn new(ledger: Arc<L>, topics: Arc<T>, scheduler: S, config: &GlobalConfig) -> Self {
        Self {
            ledger,
            topics,
            scheduler,
            supported_source: SourceKind::from(config.extraction.supported_source.as_str()),
            default_base_url: config.base_url.clone(),
        }
    }

    /// Start an extraction batch for the request's user, or join the one
    /// already in flight.
    pub async fn request_extraction(&self, mut req: ExtractionRequest) -> Result<ExtractionTicket, ExtractionError> {
        req.validate()?;
        let user_id = req
            .primary_user()
            .cloned()
            .ok_or_else(|| ValidationError::field("userIds", "at least one user is required"))?;
        if req.base_url.is_empty() {
            req.base_url = self.default_base_url.clone();
        }

        if let Some(active) = self
            .ledger
            .find_active_task(&user_id, AsyncTaskType::UserMemoryExtraction)
            .await?
        {
            info!(%user_id, task_id = %active.id, "extraction already in flight");
            return Ok(ticket(active, true));
        }

        let topic_ids = self.resolve_topics(&req, &user_id).await?;
        let task = AsyncTask::new_extraction(
            user_id.clone(),
            DateRange {
                from: req.from,
                to: req.to,
            },
            self.supported_source.clone(),
            topic_ids.len() as u32,
        );

        let task = match self.ledger.create_task(&task).await? {
            CreateTaskOutcome::Existing(existing) => {
                info!(%user_id, task_id = %existing.id, "lost creation race to an active task");
                return Ok(ticket(existing, true));
            }
            CreateTaskOutcome::Created(task) => task,
        };

        if !task.status.is_active() {
            info!(%user_id, task_id = %task.id, "no eligible topics; nothing to extract");
            return Ok(ticket(task, false));
        }

        req.topic_ids = topic_ids;
        req.async_task_id = Some(task.id);
        if let Err(e) = self.scheduler.schedule(req, task.id).await {
            let message = e.to_string();
            error!(%user_id, task_id = %task.id, error = %message, "failed to hand off extraction batch");
            self.ledger
                .mark_error(&task.id, TaskErrorKind::TaskTriggerError, &message)
                .await?;
            return Err(ExtractionError::Scheduling {
                task_id: task.id,
                message,
            });
        }

        info!(%user_id, task_id = %task.id, topics = task.metadata.progress.total_topics, "extraction batch scheduled");
        Ok(ticket(task, false))
    }

    pub async fn get_task(&self, id: &Uuid) -> Result<AsyncTask, ExtractionError> {
        self.ledger
            .get_task(id)
            .await?
            .ok_or(ExtractionError::TaskNotFound(*id))
    }

    /// Explicit topic ids win; otherwise ask storage which topics are due.
    async fn resolve_topics(&self, req: &ExtractionRequest, user_id: &UserId) -> Result<Vec<TopicId>, ExtractionError> {
        if !req.sources.contains(&self.supported_source) {
            info!(%user_id, "source not supported");
            return Ok(Vec::new());
        }

        if !req.topic_ids.is_empty() {
            let mut topic_ids: Vec<TopicId> = Vec::with_capacity(req.topic_ids.len());
            for topic_id in &req.topic_ids {
                if !topic_ids.contains(topic_id) {
                    topic_ids.push(topic_id.clone());
                }
            }
            return Ok(topic_ids);
        }

        let query = TopicQuery {
            user_id: user_id.clone(),
            from: req.from,
            to: req.to,
            include_extracted: req.force_all || req.force_topics,
        };
        Ok(self.topics.list_eligible_topics(&query).await?)
    }
}

fn ticket(task: AsyncTask, deduped: bool) -> ExtractionTicket {
    ExtractionTicket {
        task_id: task.id,
        status: task.status,
        deduped,
        metadata: task.metadata,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{TimeZone, Utc};
    use memoria_types::task::AsyncTaskStatus;

    use super::*;
    use crate::extraction::scheduler::SchedulerError;
    use crate::extraction::testing::{MemoryLedger, StaticTopics};

    /// Records hand-offs instead of running them.
    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<(ExtractionRequest, Uuid)>>,
        fail: bool,
    }

    impl BatchScheduler for RecordingScheduler {
        async fn schedule(&self, request: ExtractionRequest, task_id: Uuid) -> Result<(), SchedulerError> {
            if self.fail {
                return Err(SchedulerError::Rejected("dispatch transport unreachable".to_string()));
            }
            self.scheduled.lock().unwrap().push((request, task_id));
            Ok(())
        }
    }

    fn service(
        topics: &[&str],
        scheduler: RecordingScheduler,
    ) -> (
        ExtractionService<MemoryLedger, StaticTopics, RecordingScheduler>,
        Arc<MemoryLedger>,
        Arc<StaticTopics>,
    ) {
        let ledger = Arc::new(MemoryLedger::default());
        let topics = Arc::new(StaticTopics::new(topics));
        let mut config = GlobalConfig::default();
        config.base_url = "http://localhost:3010".to_string();
        let svc = ExtractionService::new(Arc::clone(&ledger), Arc::clone(&topics), scheduler, &config);
        (svc, ledger, topics)
    }

    #[tokio::test]
    async fn second_request_is_deduplicated() {
        let (svc, ledger, _) = service(&["t1", "t2"], RecordingScheduler::default());

        let first = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap();
        let second = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap();

        assert!(!first.deduped);
        assert!(second.deduped);
        assert_eq!(first.task_id, second.task_id);
        assert_eq!(ledger.len(), 1);
        assert_eq!(svc.scheduler.scheduled.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_users_are_not_deduplicated() {
        let (svc, ledger, _) = service(&["t1"], RecordingScheduler::default());

        let a = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap();
        let b = svc.request_extraction(ExtractionRequest::for_user("u2")).await.unwrap();

        assert_ne!(a.task_id, b.task_id);
        assert!(!b.deduped);
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn zero_topics_is_immediate_success() {
        let (svc, ledger, _) = service(&[], RecordingScheduler::default());

        let ticket = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap();

        assert_eq!(ticket.status, AsyncTaskStatus::Success);
        assert_eq!(ticket.metadata.progress.completed_topics, 0);
        assert_eq!(ticket.metadata.progress.total_topics, 0);
        assert!(svc.scheduler.scheduled.lock().unwrap().is_empty());
        assert_eq!(ledger.task(&ticket.task_id).status, AsyncTaskStatus::Success);

        // A finished batch does not block the next one.
        let again = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap();
        assert!(!again.deduped);
        assert_ne!(again.task_id, ticket.task_id);
    }

    #[tokio::test]
    async fn unsupported_source_counts_no_topics() {
        let (svc, _, topics) = service(&["t1"], RecordingScheduler::default());
        let mut req = ExtractionRequest::for_user("u1");
        req.sources = [SourceKind::Other("email".to_string())].into();

        let ticket = svc.request_extraction(req).await.unwrap();

        assert_eq!(ticket.status, AsyncTaskStatus::Success);
        assert!(topics.queries.lock().unwrap().is_empty());
        assert!(svc.scheduler.scheduled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_request_carries_task_and_topics() {
        let (svc, ledger, topics) = service(&["t1", "t2", "t3"], RecordingScheduler::default());
        let mut req = ExtractionRequest::for_user("u1");
        req.force_all = true;

        let ticket = svc.request_extraction(req).await.unwrap();

        assert_eq!(ticket.status, AsyncTaskStatus::Pending);
        assert_eq!(ticket.metadata.progress.total_topics, 3);
        assert!(topics.queries.lock().unwrap()[0].include_extracted);

        let scheduled = svc.scheduler.scheduled.lock().unwrap();
        let (sent, task_id) = &scheduled[0];
        assert_eq!(*task_id, ticket.task_id);
        assert_eq!(sent.async_task_id, Some(ticket.task_id));
        assert_eq!(sent.topic_ids, vec!["t1", "t2", "t3"]);
        assert_eq!(sent.base_url, "http://localhost:3010");
        assert_eq!(ledger.task(&ticket.task_id).status, AsyncTaskStatus::Pending);
    }

    #[tokio::test]
    async fn explicit_topics_skip_the_lookup() {
        let (svc, _, topics) = service(&["t1", "t2", "t3"], RecordingScheduler::default());
        let mut req = ExtractionRequest::for_user("u1");
        req.topic_ids = vec!["x".to_string(), "x".to_string(), "y".to_string()];

        let ticket = svc.request_extraction(req).await.unwrap();

        assert_eq!(ticket.metadata.progress.total_topics, 2);
        assert!(topics.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_hand_off_marks_task_error() {
        let scheduler = RecordingScheduler {
            fail: true,
            ..RecordingScheduler::default()
        };
        let (svc, ledger, _) = service(&["t1"], scheduler);

        let err = svc.request_extraction(ExtractionRequest::for_user("u1")).await.unwrap_err();

        let ExtractionError::Scheduling { task_id, message } = err else {
            panic!("expected a scheduling error");
        };
        assert!(message.contains("unreachable"));
        let task = ledger.task(&task_id);
        assert_eq!(task.status, AsyncTaskStatus::Error);
        assert_eq!(task.error.unwrap().kind, TaskErrorKind::TaskTriggerError);

        // The failed batch no longer blocks a retry.
        assert!(
            ledger
                .find_active_task("u1", AsyncTaskType::UserMemoryExtraction)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn inverted_range_is_rejected_before_any_record() {
        let (svc, ledger, topics) = service(&["t1"], RecordingScheduler::default());
        let mut req = ExtractionRequest::for_user("u1");
        req.from = Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        req.to = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let err = svc.request_extraction(req).await.unwrap_err();

        assert!(matches!(
            err,
            ExtractionError::Validation(ValidationError::InvertedRange { .. })
        ));
        assert_eq!(ledger.len(), 0);
        assert!(topics.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn request_without_user_is_rejected() {
        let (svc, ledger, _) = service(&["t1"], RecordingScheduler::default());
        let mut req = ExtractionRequest::for_user("u1");
        req.user_ids.clear();

        let err = svc.request_extraction(req).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Validation(ValidationError::InvalidField { .. })));
        assert_eq!(ledger.len(), 0);
    }

    #[tokio::test]
    async fn get_task_reports_missing_ids() {
        let (svc, _, _) = service(&["t1"], RecordingScheduler::default());
        let id = Uuid::now_v7();
        assert!(matches!(svc.get_task(&id).await, Err(ExtractionError::TaskNotFound(missing)) if missing == id));
    }
}
