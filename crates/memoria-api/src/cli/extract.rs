//! `memoria extract` and `memoria task`.

use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use serde_json::{Map, Value};
use uuid::Uuid;

use memoria_core::extraction::normalize::normalize;
use memoria_types::task::{AsyncTask, AsyncTaskStatus};

use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Build the trigger payload the same way the REST endpoint does.
fn payload(user: &str, from: Option<&str>, to: Option<&str>, force_all: bool) -> Value {
    let mut map = Map::new();
    map.insert("userId".to_string(), Value::from(user));
    if let Some(from) = from {
        map.insert("fromDate".to_string(), Value::from(from));
    }
    if let Some(to) = to {
        map.insert("toDate".to_string(), Value::from(to));
    }
    map.insert("forceAll".to_string(), Value::Bool(force_all));
    map.insert("userInitiated".to_string(), Value::Bool(true));
    Value::Object(map)
}

pub async fn extract(
    state: &AppState,
    user: &str,
    from: Option<&str>,
    to: Option<&str>,
    force_all: bool,
    wait: bool,
    json: bool,
) -> Result<()> {
    let request = normalize(&payload(user, from, to, force_all))?;
    let ticket = state.extraction_service.request_extraction(request).await?;

    if !wait || !ticket.status.is_active() {
        if json {
            println!("{}", serde_json::to_string_pretty(&ticket)?);
        } else {
            let note = if ticket.deduped { " (already running)" } else { "" };
            println!();
            println!(
                "  {} Task {}{}",
                style("✓").green().bold(),
                style(ticket.task_id).cyan(),
                style(note).yellow()
            );
            println!(
                "  Status: {}  Topics: {}",
                ticket.status,
                ticket.metadata.progress.total_topics
            );
            if ticket.status.is_active() {
                println!(
                    "  {}",
                    style("Unfinished batches resume when `memoria serve` starts.").dim()
                );
            }
            println!();
        }
        return Ok(());
    }

    let task = wait_for_task(state, &ticket.task_id, json).await?;
    print_task(&task, json)
}

/// Poll the ledger until the task leaves pending/processing.
async fn wait_for_task(state: &AppState, id: &Uuid, json: bool) -> Result<AsyncTask> {
    let mut last_completed = None;
    loop {
        let task = state.extraction_service.get_task(id).await?;
        if !task.status.is_active() {
            return Ok(task);
        }

        let progress = task.metadata.progress;
        if !json && last_completed != Some(progress.completed_topics) {
            println!(
                "  {} {}/{} topics",
                style("…").dim(),
                progress.completed_topics,
                progress.total_topics
            );
            last_completed = Some(progress.completed_topics);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn show_task(state: &AppState, id: &str, json: bool) -> Result<()> {
    let id = Uuid::parse_str(id).with_context(|| format!("invalid task id '{id}'"))?;
    let task = state.extraction_service.get_task(&id).await?;
    print_task(&task, json)
}

fn print_task(task: &AsyncTask, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
        return Ok(());
    }

    let status = match task.status {
        AsyncTaskStatus::Success => style(task.status.to_string()).green(),
        AsyncTaskStatus::Error => style(task.status.to_string()).red(),
        _ => style(task.status.to_string()).yellow(),
    };
    let progress = task.metadata.progress;

    println!();
    println!("  {} {}", style("Task").bold(), style(task.id).cyan());
    println!("  User:     {}", task.user_id);
    println!("  Status:   {status}");
    println!(
        "  Progress: {}/{} topics",
        progress.completed_topics, progress.total_topics
    );
    if let Some(from) = task.metadata.range.from {
        println!("  From:     {}", from.to_rfc3339());
    }
    if let Some(to) = task.metadata.range.to {
        println!("  To:       {}", to.to_rfc3339());
    }
    if let Some(error) = &task.error {
        println!(
            "  Error:    {} {}",
            style(error.kind.as_str()).red(),
            error.message
        );
    }
    println!();
    Ok(())
}
