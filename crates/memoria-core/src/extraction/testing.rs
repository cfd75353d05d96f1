//! In-memory collaborators shared by the extraction tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use chrono::Utc;
use memoria_types::TopicId;
use memoria_types::error::RepositoryError;
use memoria_types::memory::MemoryLayer;
use memoria_types::task::{AsyncTask, AsyncTaskStatus, AsyncTaskType, TaskError, TaskErrorKind};
use uuid::Uuid;

use crate::durable::DurableRuntime;
use crate::durable::in_memory::InMemoryCheckpointRepository;
use crate::extraction::collaborator::{
    ExtractorError, PersonaError, PersonaTrigger, PersonaUpdateOptions, TopicExtractionParams,
    TopicExtractor,
};
use crate::repository::task::{AsyncTaskRepository, CreateTaskOutcome};
use crate::repository::topic::{TopicQuery, TopicRepository};

// --- Ledger ---

#[derive(Default)]
pub struct MemoryLedger {
    tasks: Mutex<HashMap<Uuid, AsyncTask>>,
}

impl MemoryLedger {
    pub fn task(&self, id: &Uuid) -> AsyncTask {
        self.tasks.lock().unwrap()[id].clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Insert a record as-is, bypassing the active-task check.
    pub fn insert(&self, task: AsyncTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }
}

impl AsyncTaskRepository for MemoryLedger {
    async fn find_active_task(
        &self,
        user_id: &str,
        task_type: AsyncTaskType,
    ) -> Result<Option<AsyncTask>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .find(|t| t.user_id == user_id && t.task_type == task_type && t.status.is_active())
            .cloned())
    }

    async fn create_task(&self, task: &AsyncTask) -> Result<CreateTaskOutcome, RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        if task.status.is_active() {
            if let Some(existing) = tasks.values().find(|t| {
                t.user_id == task.user_id && t.task_type == task.task_type && t.status.is_active()
            }) {
                return Ok(CreateTaskOutcome::Existing(existing.clone()));
            }
        }
        tasks.insert(task.id, task.clone());
        Ok(CreateTaskOutcome::Created(task.clone()))
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<AsyncTask>, RepositoryError> {
        Ok(self.tasks.lock().unwrap().get(id).cloned())
    }

    async fn mark_processing(&self, id: &Uuid) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            if task.status == AsyncTaskStatus::Pending {
                task.status = AsyncTaskStatus::Processing;
                task.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn increment_progress(&self, id: &Uuid) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            if task.status.is_active() {
                let progress = &mut task.metadata.progress;
                progress.completed_topics += 1;
                if progress.completed_topics >= progress.total_topics {
                    task.status = AsyncTaskStatus::Success;
                }
                task.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_error(&self, id: &Uuid, kind: TaskErrorKind, message: &str) -> Result<(), RepositoryError> {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(id) {
            if task.status.is_active() {
                task.status = AsyncTaskStatus::Error;
                task.error = Some(TaskError {
                    kind,
                    message: message.to_string(),
                });
            }
        }
        Ok(())
    }
}

// --- Topics ---

#[derive(Default)]
pub struct StaticTopics {
    pub topics: Vec<TopicId>,
    pub queries: Mutex<Vec<TopicQuery>>,
}

impl StaticTopics {
    pub fn new(topics: &[&str]) -> Self {
        Self {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

impl TopicRepository for StaticTopics {
    async fn list_eligible_topics(&self, query: &TopicQuery) -> Result<Vec<TopicId>, RepositoryError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.topics.clone())
    }
}

// --- Extractor ---

type CancelHook = (DurableRuntime<InMemoryCheckpointRepository>, String);

/// Records every call; fails or cancels on configured topics.
#[derive(Default)]
pub struct RecordingExtractor {
    pub calls: Mutex<Vec<TopicExtractionParams>>,
    /// Topics whose calls fail with `Rejected`.
    pub rejected_topics: HashSet<String>,
    /// Topics whose calls fail with `Transient`.
    pub transient_topics: HashSet<String>,
    /// Topic whose parallel-layer call cancels the given root run.
    pub cancel_topic: Option<String>,
    pub cancel_hook: OnceLock<CancelHook>,
    pub delay: Duration,
    pub in_flight: AtomicU32,
    pub peak_in_flight: AtomicU32,
}

impl RecordingExtractor {
    pub fn rejecting(topics: &[&str]) -> Self {
        Self {
            rejected_topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TopicExtractionParams> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, topic_id: &str) -> Vec<Vec<MemoryLayer>> {
        self.calls()
            .into_iter()
            .filter(|c| c.topic_id == topic_id)
            .map(|c| c.layers)
            .collect()
    }
}

impl TopicExtractor for RecordingExtractor {
    fn extract_topic(
        &self,
        params: &TopicExtractionParams,
    ) -> impl Future<Output = Result<(), ExtractorError>> + Send {
        let params = params.clone();
        async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.calls.lock().unwrap().push(params.clone());

            let is_parallel_phase = !params.layers.contains(&MemoryLayer::Identity);
            if is_parallel_phase && self.cancel_topic.as_deref() == Some(params.topic_id.as_str()) {
                if let Some((runtime, run_key)) = self.cancel_hook.get() {
                    runtime.cancel(run_key);
                }
            }
            if self.rejected_topics.contains(&params.topic_id) {
                return Err(ExtractorError::Rejected(format!("bad content in {}", params.topic_id)));
            }
            if self.transient_topics.contains(&params.topic_id) {
                return Err(ExtractorError::Transient("provider overloaded".to_string()));
            }
            Ok(())
        }
    }
}

// --- Persona ---

#[derive(Default)]
pub struct RecordingPersona {
    pub calls: Mutex<Vec<(String, String, PersonaUpdateOptions)>>,
    pub fail: bool,
}

impl RecordingPersona {
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PersonaTrigger for RecordingPersona {
    async fn trigger_persona_update(
        &self,
        user_id: &str,
        base_url: &str,
        options: &PersonaUpdateOptions,
    ) -> Result<(), PersonaError> {
        self.calls
            .lock()
            .unwrap()
            .push((user_id.to_string(), base_url.to_string(), options.clone()));
        if self.fail {
            return Err(PersonaError::Rejected("persona service said no".to_string()));
        }
        Ok(())
    }
}
