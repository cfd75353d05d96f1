//! In-process durable workflow runtime.
//!
//! Provides the three primitives the extraction orchestrator is written
//! against:
//!
//! - `StepContext::run_step` -- memoized, at-least-once step execution keyed
//!   by `(run_key, step_key)`. A step that already completed returns its
//!   stored result without running again.
//! - `StepContext::invoke` -- run a nested workflow under a flow-control key
//!   that caps how many invocations sharing the key run at once. Settled child
//!   runs are never executed twice, so their failure callback fires at most
//!   once.
//! - Cancellation via `CancellationToken`, surfaced to workflow code as
//!   `WorkflowError::Abort`.
//!
//! A run key executes at most once at a time: a second caller waits for the
//! first to settle and then answers from the checkpoint store.
//!
//! Nothing held in memory between steps is assumed to survive: a run resumed
//! after a crash replays its workflow function and every completed step is
//! answered from the checkpoint store.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use memoria_types::workflow::{WorkflowError, WorkflowRunStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::repository::checkpoint::CheckpointRepository;

use super::checkpoint::CheckpointManager;
use super::retry::RuntimePolicy;

// ---------------------------------------------------------------------------
// DurableWorkflow trait
// ---------------------------------------------------------------------------

/// A workflow the runtime can run, retry, resume, and invoke as a child.
///
/// `run` must be a deterministic composition of `run_step`/`invoke` calls:
/// on retry or resume it is called again from the top with the same input.
pub trait DurableWorkflow: Send + Sync + 'static {
    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable workflow name, persisted with every run.
    const NAME: &'static str;

    fn run<C: CheckpointRepository + 'static>(
        &self,
        ctx: &StepContext<C>,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, WorkflowError>> + Send;

    /// Called once when a run ends in a terminal failure. Never called for
    /// aborts.
    fn on_failure(
        &self,
        _input: &Self::Input,
        _error: &WorkflowError,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

// ---------------------------------------------------------------------------
// Invocation types
// ---------------------------------------------------------------------------

/// Flow control for a nested workflow invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Invocations sharing this key share one concurrency cap.
    pub flow_control_key: String,
    /// Maximum concurrent invocations under the key (floored at 1).
    pub flow_control_limit: u32,
}

/// How a nested workflow ended, as seen by its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome<O> {
    Completed(O),
    /// Terminal failure, already handled by the child's failure callback.
    Failed(String),
}

impl<O> InvokeOutcome<O> {
    pub fn is_failed(&self) -> bool {
        matches!(self, InvokeOutcome::Failed(_))
    }
}

// ---------------------------------------------------------------------------
// DurableRuntime
// ---------------------------------------------------------------------------

struct RuntimeInner<C: CheckpointRepository> {
    checkpoints: CheckpointManager<C>,
    policy: RuntimePolicy,
    /// Flow-control semaphores keyed by flow-control key.
    flow_control: DashMap<String, Arc<Semaphore>>,
    /// Cancellation tokens of root runs keyed by run key.
    root_tokens: DashMap<String, CancellationToken>,
    /// Execution claims keyed by run key, root and child alike.
    run_claims: DashMap<String, Arc<Mutex<()>>>,
    shut_down: AtomicBool,
}

/// Handle to the runtime. Cloning is cheap and shares all state.
pub struct DurableRuntime<C: CheckpointRepository> {
    inner: Arc<RuntimeInner<C>>,
}

impl<C: CheckpointRepository> Clone for DurableRuntime<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: CheckpointRepository + 'static> DurableRuntime<C> {
    pub fn new(repo: C, policy: RuntimePolicy) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                checkpoints: CheckpointManager::new(repo),
                policy,
                flow_control: DashMap::new(),
                root_tokens: DashMap::new(),
                run_claims: DashMap::new(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn checkpoints(&self) -> &CheckpointManager<C> {
        &self.inner.checkpoints
    }

    pub fn policy(&self) -> RuntimePolicy {
        self.inner.policy
    }

    /// Run a root workflow to completion in the current task.
    ///
    /// Returns the stored output without re-running when `run_key` already
    /// completed, and the stored failure when it already failed. While the
    /// same key is in flight elsewhere this waits for it to settle first.
    pub async fn start<W: DurableWorkflow>(
        &self,
        workflow: &W,
        run_key: &str,
        input: W::Input,
    ) -> Result<W::Output, WorkflowError> {
        if self.is_shut_down() {
            return Err(WorkflowError::Abort);
        }

        let _claim = self.inner.claim(run_key).await;

        let token = CancellationToken::new();
        self.inner
            .root_tokens
            .insert(run_key.to_string(), token.clone());
        if self.is_shut_down() {
            token.cancel();
        }

        let result = self.inner.execute(workflow, run_key, input, token).await;
        self.inner.root_tokens.remove(run_key);
        result
    }

    /// Run a root workflow on a spawned tokio task.
    pub fn spawn<W: DurableWorkflow>(
        &self,
        workflow: Arc<W>,
        run_key: String,
        input: W::Input,
    ) -> JoinHandle<Result<W::Output, WorkflowError>> {
        let runtime = self.clone();
        tokio::spawn(async move { runtime.start(workflow.as_ref(), &run_key, input).await })
    }

    /// Re-spawn every run of `W` left running or aborted. Returns how many
    /// runs were resumed.
    pub async fn resume_incomplete<W: DurableWorkflow>(
        &self,
        workflow: Arc<W>,
    ) -> Result<usize, WorkflowError> {
        let runs = self.inner.checkpoints.incomplete_runs(W::NAME).await?;
        let mut resumed = 0;

        for run in runs {
            let input: W::Input = match serde_json::from_value(run.input.clone()) {
                Ok(input) => input,
                Err(e) => {
                    warn!(run_key = %run.run_key, error = %e, "skipping run with unreadable input");
                    continue;
                }
            };

            info!(run_key = %run.run_key, workflow = W::NAME, "resuming interrupted run");
            drop(self.spawn(Arc::clone(&workflow), run.run_key, input));
            resumed += 1;
        }

        Ok(resumed)
    }

    /// Cancel a running root workflow. Returns `false` if it is not running.
    pub fn cancel(&self, run_key: &str) -> bool {
        match self.inner.root_tokens.get(run_key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Refuse new runs and cancel every running one.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        for token in self.inner.root_tokens.iter() {
            token.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }
}

impl<C: CheckpointRepository + 'static> RuntimeInner<C> {
    /// Wait until nobody else is executing `run_key`, then hold it.
    async fn claim(&self, run_key: &str) -> RunClaim<'_> {
        let lock = self
            .run_claims
            .entry(run_key.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        RunClaim {
            claims: &self.run_claims,
            run_key: run_key.to_string(),
            guard: Some(guard),
        }
    }

    /// Caller must hold the claim on `run_key`.
    async fn execute<W: DurableWorkflow>(
        self: &Arc<Self>,
        workflow: &W,
        run_key: &str,
        input: W::Input,
        token: CancellationToken,
    ) -> Result<W::Output, WorkflowError> {
        if let Some(run) = self.checkpoints.get_run(run_key).await? {
            match run.status {
                WorkflowRunStatus::Completed => {
                    debug!(run_key, workflow = W::NAME, "run already completed");
                    let output = run.output.unwrap_or(serde_json::Value::Null);
                    return serde_json::from_value(output)
                        .map_err(|e| WorkflowError::terminal(format!("stored output: {e}")));
                }
                WorkflowRunStatus::Failed => {
                    debug!(run_key, workflow = W::NAME, "run already failed");
                    return Err(WorkflowError::Terminal(run.error.unwrap_or_default()));
                }
                WorkflowRunStatus::Running | WorkflowRunStatus::Aborted => {}
            }
        }

        self.checkpoints.begin_run(run_key, W::NAME, &input).await?;

        let ctx = StepContext {
            runtime: Arc::clone(self),
            run_key: run_key.to_string(),
            token: token.clone(),
        };

        let mut attempt = 1u32;
        loop {
            match workflow.run(&ctx, input.clone()).await {
                Ok(output) => {
                    self.checkpoints.complete_run(run_key, &output).await?;
                    return Ok(output);
                }
                Err(WorkflowError::Abort) => {
                    self.record_abort(run_key).await;
                    return Err(WorkflowError::Abort);
                }
                Err(_) if token.is_cancelled() => {
                    self.record_abort(run_key).await;
                    return Err(WorkflowError::Abort);
                }
                Err(WorkflowError::Retryable(msg)) if self.policy.workflow.should_retry(attempt) => {
                    warn!(
                        run_key,
                        workflow = W::NAME,
                        attempt,
                        error = %msg,
                        "workflow failed; retrying"
                    );
                    let delay = self.policy.workflow.backoff_for(attempt);
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            self.record_abort(run_key).await;
                            return Err(WorkflowError::Abort);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => {
                    let err = err.into_terminal();
                    workflow.on_failure(&input, &err).await;
                    self.checkpoints.fail_run(run_key, err.message()).await?;
                    return Err(err);
                }
            }
        }
    }

    async fn record_abort(&self, run_key: &str) {
        info!(run_key, "run aborted");
        if let Err(e) = self.checkpoints.abort_run(run_key).await {
            warn!(run_key, error = %e, "failed to checkpoint aborted run");
        }
    }

    fn flow_control_semaphore(&self, key: &str, limit: u32) -> Arc<Semaphore> {
        self.flow_control
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(limit.max(1) as usize)))
            .clone()
    }

    /// Drop the semaphore once nobody holds or waits on it.
    fn release_flow_control(&self, key: &str) {
        self.flow_control
            .remove_if(key, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

/// Exclusive right to execute one run key. Released on drop.
struct RunClaim<'a> {
    claims: &'a DashMap<String, Arc<Mutex<()>>>,
    run_key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.claims
            .remove_if(&self.run_key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Execution context handed to `DurableWorkflow::run`.
pub struct StepContext<C: CheckpointRepository> {
    runtime: Arc<RuntimeInner<C>>,
    run_key: String,
    token: CancellationToken,
}

impl<C: CheckpointRepository + 'static> StepContext<C> {
    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Execute a memoized step.
    ///
    /// Retryable failures are retried per the runtime's step policy with
    /// exponential backoff. A step interrupted by cancellation reports
    /// `Abort` and its result is not stored, so it runs again on resume.
    pub async fn run_step<T, F, Fut>(&self, step_key: &str, mut step: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, WorkflowError>> + Send,
    {
        if self.token.is_cancelled() {
            return Err(WorkflowError::Abort);
        }

        if let Some(memo) = self
            .runtime
            .checkpoints
            .load_step::<T>(&self.run_key, step_key)
            .await?
        {
            debug!(run_key = %self.run_key, step_key, "step memo hit");
            return Ok(memo);
        }

        let policy = self.runtime.policy.step;
        let mut attempt = 1u32;
        loop {
            let outcome = tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(WorkflowError::Abort),
                result = step() => result,
            };

            if self.token.is_cancelled() {
                debug!(run_key = %self.run_key, step_key, "step interrupted by cancellation");
                return Err(WorkflowError::Abort);
            }

            match outcome {
                Ok(value) => {
                    self.runtime
                        .checkpoints
                        .save_step(&self.run_key, step_key, &value)
                        .await?;
                    return Ok(value);
                }
                Err(WorkflowError::Retryable(msg)) if policy.should_retry(attempt) => {
                    warn!(
                        run_key = %self.run_key,
                        step_key,
                        attempt,
                        error = %msg,
                        "step failed; retrying"
                    );
                    let delay = policy.backoff_for(attempt);
                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return Err(WorkflowError::Abort),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Invoke a nested workflow and wait for it to settle.
    ///
    /// The child's run key is `{run_key}/{key}`. Terminal child failures come
    /// back as `InvokeOutcome::Failed` rather than an error; aborts propagate.
    pub async fn invoke<W: DurableWorkflow>(
        &self,
        key: &str,
        options: &InvokeOptions,
        workflow: &W,
        body: W::Input,
    ) -> Result<InvokeOutcome<W::Output>, WorkflowError> {
        if self.token.is_cancelled() {
            return Err(WorkflowError::Abort);
        }

        let child_key = format!("{}/{}", self.run_key, key);
        let _claim = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(WorkflowError::Abort),
            claim = self.runtime.claim(&child_key) => claim,
        };

        let semaphore = self
            .runtime
            .flow_control_semaphore(&options.flow_control_key, options.flow_control_limit);

        let permit = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(WorkflowError::Abort),
            permit = semaphore.acquire_owned() => permit
                .map_err(|_| WorkflowError::retryable("flow control semaphore closed"))?,
        };

        debug!(
            run_key = %child_key,
            workflow = W::NAME,
            flow_control_key = %options.flow_control_key,
            "invoking nested workflow"
        );

        let result = self
            .runtime
            .execute(workflow, &child_key, body, self.token.child_token())
            .await;

        drop(permit);
        self.runtime.release_flow_control(&options.flow_control_key);

        match result {
            Ok(output) => Ok(InvokeOutcome::Completed(output)),
            Err(WorkflowError::Terminal(msg)) => Ok(InvokeOutcome::Failed(msg)),
            Err(err) => Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
