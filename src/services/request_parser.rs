//! Free-text request parsing.
//!
//! The chat path derives a task type and priority from keywords. This
//! heuristic is deliberately isolated so it can be swapped for a model-
//! backed classifier without touching the manager.

use crate::domain::models::task::{TaskPriority, TaskType};

/// Parsed requirements derived from a free-text request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub task_type: TaskType,
    pub priority: TaskPriority,
    pub keywords: Vec<String>,
}

/// Derive a task type and priority from a free-text message.
pub fn parse_request(message: &str) -> ParsedRequest {
    let lower = message.to_lowercase();

    let task_type = if contains_any(&lower, &["analyze", "analysis", "review", "examine"]) {
        TaskType::RepositoryAnalysis
    } else if contains_any(&lower, &["code", "implement", "build", "create", "generate"]) {
        TaskType::CodeGeneration
    } else if contains_any(&lower, &["plan", "design", "architecture"]) {
        TaskType::Planning
    } else {
        TaskType::RepositoryAnalysis
    };

    let priority = if contains_any(&lower, &["urgent", "critical", "asap"]) {
        TaskPriority::High
    } else if contains_any(&lower, &["low", "minor", "small"]) {
        TaskPriority::Low
    } else {
        TaskPriority::Medium
    };

    ParsedRequest {
        task_type,
        priority,
        keywords: extract_keywords(&lower),
    }
}

fn contains_any(message: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| message.contains(k))
}

/// Technical terms worth carrying into the task context.
fn extract_keywords(lower: &str) -> Vec<String> {
    const TECH_KEYWORDS: &[&str] = &[
        "api", "database", "service", "function", "class", "method", "test", "bug", "error",
        "performance", "security", "deploy", "refactor", "optimize", "documentation", "pattern",
    ];
    TECH_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .map(|k| (*k).to_string())
        .collect()
}
