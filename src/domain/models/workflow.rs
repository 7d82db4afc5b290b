//! Workflow state and result models.
//!
//! The engine exclusively owns a `WorkflowState` and threads it through
//! the phase graph; phase handlers receive snapshots and return output
//! maps that the engine merges back. Once the workflow status is
//! terminal the state is read-only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::task::{ContextMap, Task, TaskType};

/// Workflow execution status (wire enumeration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    RequiresApproval,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RequiresApproval => "requires_approval",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Status of a single phase execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Named phases of the code-generation workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    RepositoryAnalysis,
    /// Join sentinel present while the two planning branches run
    PlanningFanOut,
    CuttingEdgePlanning,
    ConservativePlanning,
    PlanSynthesis,
    CodeGeneration,
    Debugging,
    Optimization,
    QualityAssessment,
    HumanApproval,
    Finalization,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryAnalysis => "repository_analysis",
            Self::PlanningFanOut => "planning_fan_out",
            Self::CuttingEdgePlanning => "cutting_edge_planning",
            Self::ConservativePlanning => "conservative_planning",
            Self::PlanSynthesis => "plan_synthesis",
            Self::CodeGeneration => "code_generation",
            Self::Debugging => "debugging",
            Self::Optimization => "optimization",
            Self::QualityAssessment => "quality_assessment",
            Self::HumanApproval => "human_approval",
            Self::Finalization => "finalization",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human approval decision for a workflow paused at the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Typed shared state threaded through all phases of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    // Task information
    pub task_id: Uuid,
    pub task_description: String,
    pub task_type: TaskType,
    pub task_context: ContextMap,

    // Phase outputs
    pub repository_analysis: Option<ContextMap>,
    pub relevant_files: Vec<String>,
    pub code_patterns: Vec<String>,
    pub cutting_edge_plan: Option<ContextMap>,
    pub conservative_plan: Option<ContextMap>,
    pub synthesis_plan: Option<ContextMap>,
    pub selected_plan: Option<ContextMap>,
    pub generated_code: Option<String>,
    pub debugged_code: Option<String>,
    pub optimized_code: Option<String>,
    pub test_results: Option<ContextMap>,
    pub quality_assessment: Option<ContextMap>,

    // Control fields
    pub workflow_status: WorkflowStatus,
    pub current_phase: Phase,
    pub retry_count: u32,
    pub errors: Vec<String>,
    pub requires_human_approval: bool,
    pub approval_status: Option<ApprovalStatus>,

    // Assignments
    /// phase name -> agent id
    pub phase_agents: HashMap<String, String>,
    /// agent id -> output
    pub agent_outputs: HashMap<String, Value>,
}

impl WorkflowState {
    /// Initialize state for a workflow task.
    pub fn for_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            task_description: task.description.clone(),
            task_type: task.task_type,
            task_context: task.context.clone(),
            repository_analysis: None,
            relevant_files: Vec::new(),
            code_patterns: Vec::new(),
            cutting_edge_plan: None,
            conservative_plan: None,
            synthesis_plan: None,
            selected_plan: None,
            generated_code: None,
            debugged_code: None,
            optimized_code: None,
            test_results: None,
            quality_assessment: None,
            workflow_status: WorkflowStatus::Running,
            current_phase: Phase::RepositoryAnalysis,
            retry_count: 0,
            errors: Vec::new(),
            requires_human_approval: false,
            approval_status: None,
            phase_agents: HashMap::new(),
            agent_outputs: HashMap::new(),
        }
    }

    /// Append an error. The error list is append-only within a run.
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Record which agent handled a phase and what it produced.
    pub fn record_assignment(&mut self, phase: Phase, agent_id: &str, output: Value) {
        self.phase_agents
            .insert(phase.as_str().to_string(), agent_id.to_string());
        self.agent_outputs.insert(agent_id.to_string(), output);
    }

    pub fn is_terminal(&self) -> bool {
        self.workflow_status.is_terminal()
    }
}

/// Execution record for one phase of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub phase: Phase,
    pub agent_id: Option<String>,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl PhaseExecution {
    pub fn begin(phase: Phase) -> Self {
        Self {
            phase,
            agent_id: None,
            status: PhaseStatus::Running,
            started_at: Some(Utc::now()),
            ended_at: None,
            duration_seconds: None,
            error: None,
            retry_count: 0,
        }
    }

    fn finish(&mut self, status: PhaseStatus) {
        let now = Utc::now();
        self.ended_at = Some(now);
        if let Some(start) = self.started_at {
            self.duration_seconds = Some((now - start).num_milliseconds() as f64 / 1000.0);
        }
        self.status = status;
    }

    pub fn complete(&mut self) {
        self.finish(PhaseStatus::Completed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.finish(PhaseStatus::Failed);
    }
}

/// Aggregate metrics for a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_phases_executed: usize,
    pub successful_phases: usize,
    pub failed_phases: usize,
    pub success_rate: f64,
    pub total_execution_seconds: f64,
    pub average_phase_seconds: f64,
}

impl WorkflowMetrics {
    /// Compute metrics from per-phase execution records.
    pub fn from_executions(executions: &[PhaseExecution]) -> Self {
        let total = executions.len();
        let successful = executions
            .iter()
            .filter(|e| e.status == PhaseStatus::Completed)
            .count();
        let failed = executions
            .iter()
            .filter(|e| e.status == PhaseStatus::Failed)
            .count();
        let total_seconds: f64 = executions.iter().filter_map(|e| e.duration_seconds).sum();
        Self {
            total_phases_executed: total,
            successful_phases: successful,
            failed_phases: failed,
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
            total_execution_seconds: total_seconds,
            average_phase_seconds: if total > 0 {
                total_seconds / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Result of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_duration_seconds: Option<f64>,
    pub phases_executed: Vec<String>,
    pub final_output: Option<ContextMap>,
    pub errors: Vec<String>,
    pub metrics: WorkflowMetrics,
}

impl WorkflowResult {
    pub fn started(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            total_duration_seconds: None,
            phases_executed: Vec::new(),
            final_output: None,
            errors: Vec::new(),
            metrics: WorkflowMetrics::default(),
        }
    }

    /// Finalize the result: stamp end time and total duration.
    pub fn finalize(&mut self, status: WorkflowStatus) {
        let now = Utc::now();
        self.status = status;
        self.ended_at = Some(now);
        self.total_duration_seconds =
            Some((now - self.started_at).num_milliseconds() as f64 / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::Task;

    #[test]
    fn test_state_initialization() {
        let task = Task::new("t", "implement rate limiter", TaskType::CodeGeneration);
        let state = WorkflowState::for_task(&task);
        assert_eq!(state.task_id, task.id);
        assert_eq!(state.current_phase, Phase::RepositoryAnalysis);
        assert_eq!(state.workflow_status, WorkflowStatus::Running);
        assert_eq!(state.retry_count, 0);
        assert!(state.errors.is_empty());
        assert!(!state.requires_human_approval);
    }

    #[test]
    fn test_errors_are_append_only() {
        let task = Task::new("t", "d", TaskType::CodeGeneration);
        let mut state = WorkflowState::for_task(&task);
        state.record_error("first");
        state.record_error("second");
        assert_eq!(state.errors, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_assignment_maps() {
        let task = Task::new("t", "d", TaskType::CodeGeneration);
        let mut state = WorkflowState::for_task(&task);
        state.record_assignment(
            Phase::PlanSynthesis,
            "synthesis-1",
            serde_json::json!({"steps": 2}),
        );
        assert_eq!(
            state.phase_agents.get("plan_synthesis").map(String::as_str),
            Some("synthesis-1")
        );
        assert!(state.agent_outputs.contains_key("synthesis-1"));
    }

    #[test]
    fn test_phase_execution_durations() {
        let mut exec = PhaseExecution::begin(Phase::CodeGeneration);
        assert_eq!(exec.status, PhaseStatus::Running);
        exec.complete();
        assert_eq!(exec.status, PhaseStatus::Completed);
        assert!(exec.duration_seconds.is_some());
        assert!(exec.duration_seconds.unwrap() >= 0.0);

        let mut failed = PhaseExecution::begin(Phase::Debugging);
        failed.fail("llm timeout");
        assert_eq!(failed.status, PhaseStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("llm timeout"));
    }

    #[test]
    fn test_metrics_from_executions() {
        let mut ok = PhaseExecution::begin(Phase::RepositoryAnalysis);
        ok.complete();
        let mut bad = PhaseExecution::begin(Phase::CodeGeneration);
        bad.fail("boom");

        let metrics = WorkflowMetrics::from_executions(&[ok, bad]);
        assert_eq!(metrics.total_phases_executed, 2);
        assert_eq!(metrics.successful_phases, 1);
        assert_eq!(metrics.failed_phases, 1);
        assert!((metrics.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metrics_empty() {
        let metrics = WorkflowMetrics::from_executions(&[]);
        assert!(metrics.success_rate.abs() < f64::EPSILON);
        assert!(metrics.average_phase_seconds.abs() < f64::EPSILON);
    }

    #[test]
    fn test_result_finalize() {
        let mut result = WorkflowResult::started("wf-1");
        result.finalize(WorkflowStatus::Completed);
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert!(result.ended_at.is_some());
        assert!(result.total_duration_seconds.unwrap() >= 0.0);
    }

    #[test]
    fn test_status_wire_forms() {
        assert_eq!(WorkflowStatus::RequiresApproval.as_str(), "requires_approval");
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
        assert_eq!(Phase::CuttingEdgePlanning.as_str(), "cutting_edge_planning");
    }
}
