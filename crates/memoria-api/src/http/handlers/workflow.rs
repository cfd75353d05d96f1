//! Workflow entry point for scheduled triggers.
//!
//! Accepts the permissive trigger payload, normalizes it, and runs the
//! dispatch to completion before responding. Unlike the user-facing endpoint
//! this bypasses the dedup gate: the caller already owns the ledger record
//! (or has none).

use axum::Json;
use axum::extract::State;
use serde_json::Value;
use uuid::Uuid;

use memoria_core::extraction::dispatcher::dispatch_run_key;
use memoria_core::extraction::normalize::normalize;
use memoria_types::extraction::DispatchOutcome;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// POST /api/v1/workflows/memory-extraction
pub async fn run_memory_extraction(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<ApiResponse<DispatchOutcome>>, AppError> {
    let clock = RequestClock::start();
    let mut request = normalize(&payload)?;
    if request.base_url.is_empty() {
        request.base_url = state.config.base_url.clone();
    }

    // Same key as the gate's hand-off: a trigger for a task already in flight
    // waits for that dispatch and returns its stored outcome.
    let run_key = dispatch_run_key(&request.async_task_id.unwrap_or_else(Uuid::now_v7));
    tracing::info!(run_key, "running memory extraction dispatch");

    let outcome = state
        .runtime
        .start(state.dispatcher.as_ref(), &run_key, request)
        .await?;
    Ok(Json(clock.respond(outcome)))
}
