//! Global configuration types for Memoria.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! extraction fan-out, the runtime retry policy, and the collaborator
//! endpoints.

use serde::{Deserialize, Serialize};

use crate::extraction::CHAT_TOPIC_SOURCE;

/// Top-level configuration for the orchestrator.
///
/// Loaded from `~/.memoria/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default base URL stamped onto requests that do not carry one.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub persona: PersonaConfig,
}

/// Fan-out and retry settings for extraction batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum per-topic jobs in flight for one dispatch.
    ///
    /// Independent of the number of memory layers even though the default
    /// happens to equal it.
    #[serde(default = "default_parallelism_cap")]
    pub parallelism_cap: u32,

    /// The only source this orchestrator processes.
    #[serde(default = "default_supported_source")]
    pub supported_source: String,

    /// Attempts per durable step for retryable failures.
    #[serde(default = "default_step_max_attempts")]
    pub step_max_attempts: u32,

    /// Base delay between step attempts; doubled on each retry.
    #[serde(default = "default_step_retry_backoff_ms")]
    pub step_retry_backoff_ms: u64,

    /// Attempts per workflow when it fails with a retryable error.
    #[serde(default = "default_workflow_max_attempts")]
    pub workflow_max_attempts: u32,
}

fn default_parallelism_cap() -> u32 {
    5
}

fn default_supported_source() -> String {
    CHAT_TOPIC_SOURCE.to_string()
}

fn default_step_max_attempts() -> u32 {
    3
}

fn default_step_retry_backoff_ms() -> u64 {
    500
}

fn default_workflow_max_attempts() -> u32 {
    3
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            parallelism_cap: default_parallelism_cap(),
            supported_source: default_supported_source(),
            step_max_attempts: default_step_max_attempts(),
            step_retry_backoff_ms: default_step_retry_backoff_ms(),
            workflow_max_attempts: default_workflow_max_attempts(),
        }
    }
}

impl ExtractionConfig {
    /// Parallelism cap with a floor of one.
    pub fn effective_parallelism(&self) -> u32 {
        self.parallelism_cap.max(1)
    }
}

/// Where the LLM-backed topic extractor lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Full URL of the extraction endpoint. `None` disables remote extraction.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_extractor_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_extractor_timeout_secs() -> u64 {
    120
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_extractor_timeout_secs(),
        }
    }
}

/// Persona recomposition trigger, appended to the request's base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_path")]
    pub path: String,

    #[serde(default = "default_persona_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_persona_path() -> String {
    "/api/v1/persona/recompose".to_string()
}

fn default_persona_timeout_secs() -> u64 {
    30
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            path: default_persona_path(),
            timeout_secs: default_persona_timeout_secs(),
        }
    }
}
