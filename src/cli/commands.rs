//! Command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use console::style;
use serde_json::json;

use crate::domain::models::task::{TaskPriority, TaskStatus, TaskType};
use crate::services::swarm_manager::{SwarmManager, SwarmRequest};

/// Parse `key=value` context arguments.
fn parse_context(entries: &[String]) -> Result<crate::domain::models::task::ContextMap> {
    let mut context = crate::domain::models::task::ContextMap::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("context entry must be key=value: {entry}"))?;
        context.insert(key.to_string(), json!(value));
    }
    Ok(context)
}

/// Submit an objective and block until it finishes or the wait expires.
pub async fn handle_run(
    manager: &Arc<SwarmManager>,
    objective: &str,
    task_type: Option<&str>,
    priority: Option<&str>,
    context_entries: &[String],
    wait_seconds: u64,
    json_output: bool,
) -> Result<()> {
    let mut request = SwarmRequest::new(objective);
    if let Some(raw) = task_type {
        let parsed = TaskType::from_str(raw)
            .ok_or_else(|| anyhow!("unknown task type: {raw}"))?;
        request = request.with_type(parsed);
    }
    if let Some(raw) = priority {
        let parsed = TaskPriority::from_str(raw)
            .ok_or_else(|| anyhow!("unknown priority: {raw}"))?;
        request = request.with_priority(parsed);
    }
    request.context = parse_context(context_entries)?;

    let task_id = manager.submit(request).context("submission failed")?;
    eprintln!("{} {task_id}", style("submitted").green().bold());

    let record = manager
        .wait_for(task_id, Duration::from_secs(wait_seconds))
        .await
        .ok_or_else(|| anyhow!("task record disappeared"))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let status_cell = match record.status {
        TaskStatus::Completed => style(record.status.as_str()).green(),
        TaskStatus::Failed => style(record.status.as_str()).red(),
        _ => style(record.status.as_str()).yellow(),
    };
    println!("status: {status_cell}");
    println!("elapsed: {:.0} ms", record.processing_time_ms);
    if !record.agents_involved.is_empty() {
        println!("agents: {}", record.agents_involved.join(", "));
    }
    if let Some(error) = &record.error {
        println!("error: {}", style(error).red());
    }
    if !record.result.is_empty() {
        println!("{}", serde_json::to_string_pretty(&record.result)?);
    }
    Ok(())
}

/// Print the agent roster.
pub async fn handle_agents(manager: &Arc<SwarmManager>, json_output: bool) -> Result<()> {
    let statuses = manager.bus().agent_statuses().await;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Agent", "Role", "Active", "Tasks", "Capabilities",
    ]);
    let mut rows: Vec<_> = statuses.into_values().collect();
    rows.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    for status in rows {
        table.add_row(vec![
            Cell::new(&status.agent_id),
            Cell::new(status.role.as_str()),
            Cell::new(status.is_active),
            Cell::new(status.current_tasks),
            Cell::new(status.capabilities.join(", ")),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Print swarm health.
pub fn handle_health(manager: &Arc<SwarmManager>, json_output: bool) -> Result<()> {
    let status = manager.swarm_status();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!(
        "initialized: {}  agents: {}  active_tasks: {}",
        status.initialized, status.agents, status.active_tasks
    );
    if let Some(error) = &status.initialization_error {
        println!("initialization_error: {}", style(error).red());
    }
    Ok(())
}
