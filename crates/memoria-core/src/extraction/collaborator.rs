//! Ports for the external collaborators the orchestrator drives.
//!
//! The extractor turns one topic's messages into memory records; the persona
//! trigger rebuilds a user's profile after a batch. Both are opaque here.

use chrono::{DateTime, Utc};
use memoria_types::extraction::{PerTopicJob, SourceKind};
use memoria_types::memory::MemoryLayer;
use memoria_types::workflow::WorkflowError;
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Topic extractor
// ---------------------------------------------------------------------------

/// Parameters of one extractor call: one topic, one layer group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicExtractionParams {
    pub user_id: String,
    pub topic_id: String,
    /// May be empty; the extractor must then do nothing.
    pub layers: Vec<MemoryLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    pub force_all: bool,
    pub force_topics: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_task_id: Option<Uuid>,
    pub user_initiated: bool,
    pub source: SourceKind,
}

impl TopicExtractionParams {
    pub fn for_job(job: &PerTopicJob, layers: Vec<MemoryLayer>) -> Self {
        Self {
            user_id: job.user_id.clone(),
            topic_id: job.topic_id.clone(),
            layers,
            from: job.from,
            to: job.to,
            force_all: job.force_all,
            force_topics: job.force_topics,
            async_task_id: job.async_task_id,
            user_initiated: job.user_initiated,
            source: job.source.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractorError {
    /// Timeouts, connection failures, overload. Worth another attempt.
    #[error("extractor unavailable: {0}")]
    Transient(String),

    /// The extractor refused or failed on this input. Retrying won't help.
    #[error("extraction rejected: {0}")]
    Rejected(String),
}

impl From<ExtractorError> for WorkflowError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::Transient(_) => WorkflowError::Retryable(err.to_string()),
            ExtractorError::Rejected(_) => WorkflowError::Terminal(err.to_string()),
        }
    }
}

/// LLM-backed memory extractor.
pub trait TopicExtractor: Send + Sync {
    fn extract_topic(
        &self,
        params: &TopicExtractionParams,
    ) -> impl std::future::Future<Output = Result<(), ExtractorError>> + Send;
}

// ---------------------------------------------------------------------------
// Persona trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaUpdateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub async_task_id: Option<Uuid>,
    /// Topics attempted in the batch that preceded this trigger.
    pub topic_count: u32,
    pub user_initiated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersonaError {
    #[error("persona service unavailable: {0}")]
    Unavailable(String),

    #[error("persona update rejected: {0}")]
    Rejected(String),
}

impl From<PersonaError> for WorkflowError {
    fn from(err: PersonaError) -> Self {
        match err {
            PersonaError::Unavailable(_) => WorkflowError::Retryable(err.to_string()),
            PersonaError::Rejected(_) => WorkflowError::Terminal(err.to_string()),
        }
    }
}

/// Downstream persona recomposition. Awaited for ordering only.
pub trait PersonaTrigger: Send + Sync {
    fn trigger_persona_update(
        &self,
        user_id: &str,
        base_url: &str,
        options: &PersonaUpdateOptions,
    ) -> impl std::future::Future<Output = Result<(), PersonaError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_types::extraction::ExtractionRequest;

    #[test]
    fn extractor_error_classification() {
        let err: WorkflowError = ExtractorError::Transient("timeout".into()).into();
        assert!(matches!(err, WorkflowError::Retryable(ref m) if m.contains("timeout")));

        let err: WorkflowError = ExtractorError::Rejected("malformed topic".into()).into();
        assert!(matches!(err, WorkflowError::Terminal(_)));
    }

    #[test]
    fn persona_error_classification() {
        let err: WorkflowError = PersonaError::Unavailable("503".into()).into();
        assert!(matches!(err, WorkflowError::Retryable(_)));
        let err: WorkflowError = PersonaError::Rejected("400".into()).into();
        assert!(matches!(err, WorkflowError::Terminal(_)));
    }

    #[test]
    fn params_copy_job_fields() {
        let mut req = ExtractionRequest::for_user("u1");
        req.force_topics = true;
        req.user_initiated = true;
        let job = PerTopicJob::from_request(&req, "u1", "t1", SourceKind::ChatTopic);

        let params = TopicExtractionParams::for_job(&job, vec![MemoryLayer::Identity]);
        assert_eq!(params.topic_id, "t1");
        assert!(params.force_topics && params.user_initiated);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["layers"], serde_json::json!(["identity"]));
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["source"], "chat-topic");
        assert!(json.get("from").is_none());
    }
}
