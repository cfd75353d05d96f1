//! Ledger record lookup.

use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use memoria_types::task::AsyncTask;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AsyncTask>>, AppError> {
    let clock = RequestClock::start();
    let id = Uuid::parse_str(&id).map_err(|e| AppError::BadRequest(format!("invalid task id: {e}")))?;

    let task = state.extraction_service.get_task(&id).await?;
    let href = format!("/api/v1/tasks/{id}");
    Ok(Json(clock.respond(task).with_link("self", href)))
}
