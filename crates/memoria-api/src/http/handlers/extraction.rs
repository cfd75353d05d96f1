//! User-triggered memory extraction.

use axum::Json;
use axum::extract::{Path, State};
use serde_json::Value;

use memoria_core::extraction::normalize::normalize;
use memoria_types::extraction::ExtractionTicket;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// POST /api/v1/users/{user_id}/memory-extractions
///
/// Body: `{fromDate?, toDate?, forceAll?, layers?}`. Returns the ledger ticket,
/// with `deduped: true` when an extraction for the user is already running.
pub async fn trigger_extraction(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<ApiResponse<ExtractionTicket>>, AppError> {
    let clock = RequestClock::start();

    let mut payload = match body {
        Some(Json(Value::Object(map))) => map,
        Some(Json(_)) => return Err(AppError::BadRequest("body must be a JSON object".to_string())),
        None => serde_json::Map::new(),
    };
    // The path decides the user; the caller is the user.
    payload.remove("userIds");
    payload.remove("user_ids");
    payload.remove("user_id");
    payload.insert("userId".to_string(), Value::String(user_id));
    payload.insert("userInitiated".to_string(), Value::Bool(true));

    let request = normalize(&Value::Object(payload))?;
    let ticket = state.extraction_service.request_extraction(request).await?;

    let href = format!("/api/v1/tasks/{}", ticket.task_id);
    Ok(Json(clock.respond(ticket).with_link("task", href)))
}
