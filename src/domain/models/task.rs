//! Task domain model.
//!
//! Tasks are discrete units of work executed by agents. A task is created
//! by the swarm manager or the workflow engine, mutated only by its owning
//! agent (status / result / error transitions) or by the bus on shutdown,
//! and read-only to everyone else.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status of a task in the execution pipeline.
///
/// Transitions are monotonic: once terminal, a task never moves again.
/// The only shortcuts are pending -> cancelled and in_progress -> cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is defined but not yet picked up
    Pending,
    /// Manager-level: request is being decomposed into a plan
    Planning,
    /// Manager-level: a workflow is driving the task
    Executing,
    /// Manager-level: output is awaiting review or approval
    Reviewing,
    /// An agent owns the task and is working on it
    InProgress,
    /// Task completed successfully; result is set
    Completed,
    /// Task failed; error is set
    Failed,
    /// Task was cancelled by shutdown, timeout, or caller
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "planning" => Some(Self::Planning),
            "executing" => Some(Self::Executing),
            "reviewing" => Some(Self::Reviewing),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Planning, Self::InProgress, Self::Cancelled],
            Self::Planning => &[Self::Executing, Self::InProgress, Self::Cancelled],
            Self::Executing => &[Self::Reviewing, Self::Completed, Self::Failed, Self::Cancelled],
            Self::Reviewing => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::InProgress => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// What kind of work a task represents.
///
/// The type tag drives both routing (which execution path the manager
/// picks) and acceptance (agents advertise `handle_<type>` capabilities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    RepositoryAnalysis,
    CodeAnalysis,
    TaskPlanning,
    PlanSynthesis,
    CodeGeneration,
    FeatureImplementation,
    BugFix,
    Debugging,
    Optimization,
    QualityAssessment,
    Planning,
    ArchitectureDesign,
}

impl Default for TaskType {
    fn default() -> Self {
        Self::RepositoryAnalysis
    }
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryAnalysis => "repository_analysis",
            Self::CodeAnalysis => "code_analysis",
            Self::TaskPlanning => "task_planning",
            Self::PlanSynthesis => "plan_synthesis",
            Self::CodeGeneration => "code_generation",
            Self::FeatureImplementation => "feature_implementation",
            Self::BugFix => "bug_fix",
            Self::Debugging => "debugging",
            Self::Optimization => "optimization",
            Self::QualityAssessment => "quality_assessment",
            Self::Planning => "planning",
            Self::ArchitectureDesign => "architecture_design",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "repository_analysis" => Some(Self::RepositoryAnalysis),
            "code_analysis" => Some(Self::CodeAnalysis),
            "task_planning" => Some(Self::TaskPlanning),
            "plan_synthesis" => Some(Self::PlanSynthesis),
            "code_generation" => Some(Self::CodeGeneration),
            "feature_implementation" => Some(Self::FeatureImplementation),
            "bug_fix" => Some(Self::BugFix),
            "debugging" => Some(Self::Debugging),
            "optimization" => Some(Self::Optimization),
            "quality_assessment" => Some(Self::QualityAssessment),
            "planning" => Some(Self::Planning),
            "architecture_design" => Some(Self::ArchitectureDesign),
            _ => None,
        }
    }

    /// Capability string an agent must advertise to accept this type.
    pub fn capability(&self) -> String {
        format!("handle_{}", self.as_str())
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Free-form key-value payload attached to tasks and messages.
pub type ContextMap = HashMap<String, Value>;

/// A discrete unit of work executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable title
    pub title: String,
    /// Detailed description / prompt
    pub description: String,
    /// Type tag driving routing and acceptance
    pub task_type: TaskType,
    /// Priority
    pub priority: TaskPriority,
    /// Current status
    pub status: TaskStatus,
    /// When created
    pub created_at: DateTime<Utc>,
    /// Agent that owns the task while in progress
    pub assigned_agent: Option<String>,
    /// Parent task (for phase subtasks)
    pub parent_id: Option<Uuid>,
    /// Input context
    pub context: ContextMap,
    /// Output payload; set iff status is completed
    pub result: Option<ContextMap>,
    /// Failure description; set iff status is failed
    pub error: Option<String>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When a terminal status was reached
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            task_type,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            created_at: Utc::now(),
            assigned_agent: None,
            parent_id: None,
            context: ContextMap::new(),
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set parent task.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Replace the context map.
    pub fn with_context(mut self, context: ContextMap) -> Self {
        self.context = context;
        self
    }

    /// Insert a single context entry.
    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, updating timestamps.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "Cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        match new_status {
            TaskStatus::InProgress => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// Mark in progress under the given agent.
    pub fn begin(&mut self, agent_id: impl Into<String>) -> Result<(), String> {
        self.assigned_agent = Some(agent_id.into());
        self.transition_to(TaskStatus::InProgress)
    }

    /// Mark completed with a result payload.
    pub fn complete_with(&mut self, result: ContextMap) -> Result<(), String> {
        self.transition_to(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Mark failed with an error description.
    pub fn fail_with(&mut self, error: impl Into<String>) -> Result<(), String> {
        self.transition_to(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Cancel the task. Idempotent: cancelling a terminal task is a no-op.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }
        if self.description.trim().is_empty() {
            return Err("Task description cannot be empty".to_string());
        }
        if self.parent_id == Some(self.id) {
            return Err("Task cannot be its own parent".to_string());
        }
        Ok(())
    }
}
