//! In-process durable workflow substrate: memoized steps, flow-controlled
//! nested invocations, retries, cancellation, and crash resume.

pub mod checkpoint;
pub mod in_memory;
pub mod retry;
pub mod runtime;

pub use runtime::{DurableRuntime, DurableWorkflow, InvokeOptions, InvokeOutcome, StepContext};
