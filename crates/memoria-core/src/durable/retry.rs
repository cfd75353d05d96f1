//! Retry policy for durable steps and workflows.
//!
//! Stateless: the runtime tracks the attempt number and asks the policy
//! whether another attempt is allowed and how long to wait first. Only
//! `WorkflowError::Retryable` failures are ever retried.

use std::time::Duration;

use memoria_types::config::ExtractionConfig;

/// Upper bound on a single backoff delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts,
            base_backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Whether a failed `attempt` (1-based) may be followed by another.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay to wait after failed `attempt` (1-based) before retrying.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

// ---------------------------------------------------------------------------
// RuntimePolicy
// ---------------------------------------------------------------------------

/// Retry behaviour of the durable runtime at both granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimePolicy {
    /// Applied inside `run_step` to retryable step failures.
    pub step: RetryPolicy,
    /// Applied to a whole workflow that returns a retryable failure.
    pub workflow: RetryPolicy,
}

impl RuntimePolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            step: RetryPolicy::new(
                config.step_max_attempts,
                Duration::from_millis(config.step_retry_backoff_ms),
            ),
            workflow: RetryPolicy::new(config.workflow_max_attempts, Duration::ZERO),
        }
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::from_config(&ExtractionConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
