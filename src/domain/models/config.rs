//! Swarm configuration model.
//!
//! Plain serde structs with defaults; loading, merging, and validation
//! live in the infrastructure config loader.

use serde::{Deserialize, Serialize};

/// Root configuration for the swarm coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub workflow: WorkflowSettings,
    pub bus: BusSettings,
    pub agents: AgentSettings,
    pub checkpoint: CheckpointSettings,
    pub endpoints: EndpointSettings,
    pub logging: LoggingSettings,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitSettings,
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Bounded retries inside the debugging region
    pub max_retries: u32,
    /// Global workflow deadline in seconds
    pub timeout_seconds: u64,
    /// Whether quality assessment requests human approval
    pub enable_human_approval: bool,
    /// Concurrent workflow cap enforced by the manager
    pub max_concurrent_workflows: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_seconds: 1800,
            enable_human_approval: false,
            max_concurrent_workflows: 5,
        }
    }
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Bounded message history ring
    pub history_bound: usize,
    /// Default result-collection timeout in seconds
    pub collect_timeout_seconds: u64,
    /// Result-collection poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Keep-alive quiet tick interval in seconds
    pub keepalive_interval_seconds: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            history_bound: 1000,
            collect_timeout_seconds: 30,
            poll_interval_ms: 500,
            keepalive_interval_seconds: 25,
        }
    }
}

/// Per-agent resource settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Concurrency cap enforced by the accept predicate
    pub max_concurrent_tasks: usize,
    /// Conversation history ring bound
    pub conversation_history_bound: usize,
    /// Per-task execution timeout in seconds
    pub task_timeout_seconds: u64,
    /// How long terminal task copies are retained for collection
    pub finished_retention_seconds: u64,
    /// How many files the repository analyst fetches at most
    pub analyst_max_files: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            conversation_history_bound: 100,
            task_timeout_seconds: 300,
            finished_retention_seconds: 600,
            analyst_max_files: 50,
        }
    }
}

/// Checkpoint store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    Memory,
    Kv,
}

impl Default for CheckpointBackend {
    fn default() -> Self {
        Self::Memory
    }
}

/// Checkpoint store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub backend: CheckpointBackend,
    /// Sqlite path for the kv backend
    pub path: String,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            path: ".quorum/checkpoints.db".to_string(),
        }
    }
}

/// Collaborator endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub llm_endpoint: String,
    pub repo_endpoint: String,
    pub audit_db_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            llm_endpoint: "http://localhost:8100".to_string(),
            repo_endpoint: "http://localhost:8200".to_string(),
            audit_db_url: None,
            cors_origins: Vec::new(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// trace, debug, info, warn, error
    pub level: String,
    /// json or pretty
    pub format: String,
    /// Optional directory for rolling file output
    pub log_dir: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            log_dir: None,
        }
    }
}

/// Retry settings for collaborator HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Rate limit settings for the language-model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}
