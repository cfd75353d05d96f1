//! Extraction request, per-topic job, and dispatch result types.
//!
//! `ExtractionRequest` is the canonical shape every trigger payload is
//! normalized into. `PerTopicJob` is the immutable unit of fan-out derived
//! from it, one per topic.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::memory::MemoryLayer;
use crate::task::{AsyncTaskStatus, TaskMetadata};
use crate::{TopicId, UserId};

/// Wire name of the chat-topic source.
pub const CHAT_TOPIC_SOURCE: &str = "chat-topic";

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

/// Where the material for extraction comes from.
///
/// Unknown names are preserved rather than rejected: an unsupported source is
/// a gating decision made by the dispatcher, not a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceKind {
    ChatTopic,
    Other(String),
}

impl SourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            SourceKind::ChatTopic => CHAT_TOPIC_SOURCE,
            SourceKind::Other(name) => name,
        }
    }
}

impl From<String> for SourceKind {
    fn from(value: String) -> Self {
        if value == CHAT_TOPIC_SOURCE {
            SourceKind::ChatTopic
        } else {
            SourceKind::Other(value)
        }
    }
}

impl From<&str> for SourceKind {
    fn from(value: &str) -> Self {
        SourceKind::from(value.to_string())
    }
}

impl From<SourceKind> for String {
    fn from(value: SourceKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExtractionRequest
// ---------------------------------------------------------------------------

/// Canonical, normalized extraction trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    /// Ledger record this run belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_task_id: Option<Uuid>,
    /// Users in scope. Dispatch currently processes the first one only.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
    /// Topics in scope, in dispatch order.
    #[serde(default)]
    pub topic_ids: Vec<TopicId>,
    #[serde(default = "default_sources")]
    pub sources: BTreeSet<SourceKind>,
    /// Empty means every layer.
    #[serde(default)]
    pub layers: BTreeSet<MemoryLayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub force_all: bool,
    #[serde(default)]
    pub force_topics: bool,
    #[serde(default)]
    pub user_initiated: bool,
    /// Address used for the downstream persona trigger call.
    #[serde(default)]
    pub base_url: String,
}

fn default_sources() -> BTreeSet<SourceKind> {
    BTreeSet::from([SourceKind::ChatTopic])
}

impl ExtractionRequest {
    /// A request for one user with default sources and all layers.
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self {
            async_task_id: None,
            user_ids: vec![user_id.into()],
            topic_ids: Vec::new(),
            sources: default_sources(),
            layers: BTreeSet::new(),
            from: None,
            to: None,
            force_all: false,
            force_topics: false,
            user_initiated: false,
            base_url: String::new(),
        }
    }

    /// Check the request invariants (currently: `from <= to`).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ValidationError::InvertedRange { from, to });
            }
        }
        Ok(())
    }

    /// The user this request is scoped to, if any.
    pub fn primary_user(&self) -> Option<&UserId> {
        self.user_ids.first()
    }

    /// The layer set a topic job should run with (empty expands to all).
    pub fn effective_layers(&self) -> BTreeSet<MemoryLayer> {
        if self.layers.is_empty() {
            MemoryLayer::ALL.into_iter().collect()
        } else {
            self.layers.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// PerTopicJob
// ---------------------------------------------------------------------------

/// One unit of fan-out: extract every requested layer for one topic.
///
/// Never mutated after creation; retries re-derive the same job and the same
/// run key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerTopicJob {
    pub user_id: UserId,
    pub topic_id: TopicId,
    pub layers: BTreeSet<MemoryLayer>,
    pub force_all: bool,
    pub force_topics: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_task_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_initiated: bool,
    pub source: SourceKind,
}

impl PerTopicJob {
    /// Build the job for one topic of a request.
    pub fn from_request(req: &ExtractionRequest, user_id: &str, topic_id: &str, source: SourceKind) -> Self {
        Self {
            user_id: user_id.to_string(),
            topic_id: topic_id.to_string(),
            layers: req.effective_layers(),
            force_all: req.force_all,
            force_topics: req.force_topics,
            async_task_id: req.async_task_id,
            from: req.from,
            to: req.to,
            user_initiated: req.user_initiated,
            source,
        }
    }

    /// Invocation key of this job's nested run, relative to its parent run.
    pub fn invoke_key(&self) -> String {
        format!("topic/{}/{}", self.user_id, self.topic_id)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What a dispatch attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Topics attempted (successes and failures both count).
    pub processed_topics: u32,
    pub processed_users: u32,
}

/// Returned by the extraction gate to the triggering caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionTicket {
    #[serde(rename = "id")]
    pub task_id: Uuid,
    pub status: AsyncTaskStatus,
    /// True when the call collapsed onto an already-active task.
    pub deduped: bool,
    pub metadata: TaskMetadata,
}
