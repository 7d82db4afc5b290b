//! Workflow engine.
//!
//! Drives a typed state through the code-generation phase graph:
//! repository analysis, parallel planning fan-out, synthesis, generation,
//! a bounded debug-retry region, optimization, quality assessment, an
//! optional human-approval gate, and finalization. Checkpoints are
//! written after every phase so interrupted workflows resume at the
//! recorded phase.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::AgentRole;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::WorkflowSettings;
use crate::domain::models::task::{ContextMap, Task, TaskPriority, TaskType};
use crate::domain::models::workflow::{
    ApprovalStatus, Phase, PhaseExecution, WorkflowMetrics, WorkflowResult, WorkflowState,
    WorkflowStatus,
};
use crate::domain::ports::approval::ApprovalGate;
use crate::domain::ports::checkpoint::CheckpointStore;

use super::message_bus::{MessageBus, ResponseStatus};

/// Where the debug conditional routes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DebugRoute {
    Optimize,
    Debug,
}

/// Successful outcome of one dispatched phase.
struct PhaseOutcome {
    agent_id: String,
    output: ContextMap,
}

/// Where the retry conditional routes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryRoute {
    Retry,
    Optimize,
    Fail,
}

/// Debug when generated code is absent or still carries an error marker.
pub(crate) fn should_debug(state: &WorkflowState) -> DebugRoute {
    match &state.generated_code {
        Some(code) if !code.to_lowercase().contains("error") => DebugRoute::Optimize,
        _ => DebugRoute::Debug,
    }
}

/// Fail once retries are exhausted, optimize when a debugged artifact
/// exists, otherwise retry generation.
pub(crate) fn should_retry(state: &WorkflowState, max_retries: u32) -> RetryRoute {
    if state.retry_count >= max_retries {
        RetryRoute::Fail
    } else if state.debugged_code.is_some() {
        RetryRoute::Optimize
    } else {
        RetryRoute::Retry
    }
}

/// The workflow engine.
pub struct WorkflowEngine {
    bus: Arc<MessageBus>,
    checkpointer: Arc<dyn CheckpointStore>,
    approval_gate: Arc<dyn ApprovalGate>,
    settings: WorkflowSettings,
    results: StdRwLock<HashMap<String, WorkflowResult>>,
    executions: StdRwLock<HashMap<String, Vec<PhaseExecution>>>,
    cancellations: StdRwLock<HashMap<String, CancellationToken>>,
    /// Child task ids of the phase currently in flight, per workflow.
    current_children: StdRwLock<HashMap<String, Vec<Uuid>>>,
}

impl WorkflowEngine {
    pub fn new(
        bus: Arc<MessageBus>,
        checkpointer: Arc<dyn CheckpointStore>,
        approval_gate: Arc<dyn ApprovalGate>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            bus,
            checkpointer,
            approval_gate,
            settings,
            results: StdRwLock::new(HashMap::new()),
            executions: StdRwLock::new(HashMap::new()),
            cancellations: StdRwLock::new(HashMap::new()),
            current_children: StdRwLock::new(HashMap::new()),
        }
    }

    /// Execute a complete workflow for the given task.
    pub async fn execute(&self, task: &Task) -> WorkflowResult {
        let workflow_id = format!("workflow_{}", task.id);
        let mut state = WorkflowState::for_task(task);
        self.run(workflow_id, &mut state).await
    }

    /// Resume a workflow from its last checkpoint.
    pub async fn resume(&self, workflow_id: &str) -> DomainResult<WorkflowResult> {
        let checkpoint = self
            .checkpointer
            .get_latest(workflow_id)
            .await?
            .ok_or_else(|| DomainError::WorkflowNotFound(workflow_id.to_string()))?;
        tracing::info!(
            workflow_id = %workflow_id,
            phase = %checkpoint.state.current_phase,
            "Resuming workflow from checkpoint"
        );
        let mut state = checkpoint.state;
        Ok(self.run(workflow_id.to_string(), &mut state).await)
    }

    /// Cancel a running workflow. Idempotent.
    pub fn cancel(&self, workflow_id: &str) -> bool {
        let cancellations = self.cancellations.read().expect("cancellations lock");
        if let Some(token) = cancellations.get(workflow_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Result record for a workflow, if known.
    pub fn status(&self, workflow_id: &str) -> Option<WorkflowResult> {
        self.results
            .read()
            .expect("results lock")
            .get(workflow_id)
            .cloned()
    }

    /// Per-phase execution records for a workflow.
    pub fn executions(&self, workflow_id: &str) -> Vec<PhaseExecution> {
        self.executions
            .read()
            .expect("executions lock")
            .get(workflow_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Cancel every workflow currently registered. Used at shutdown.
    pub fn cancel_all(&self) {
        for token in self.cancellations.read().expect("cancellations lock").values() {
            token.cancel();
        }
    }

    async fn run(&self, workflow_id: String, state: &mut WorkflowState) -> WorkflowResult {
        let mut result = WorkflowResult::started(workflow_id.clone());
        self.results
            .write()
            .expect("results lock")
            .insert(workflow_id.clone(), result.clone());
        self.executions
            .write()
            .expect("executions lock")
            .insert(workflow_id.clone(), Vec::new());
        let token = CancellationToken::new();
        self.cancellations
            .write()
            .expect("cancellations lock")
            .insert(workflow_id.clone(), token.clone());

        let timeout = Duration::from_secs(self.settings.timeout_seconds);
        if timeout.is_zero() {
            // A zero budget cannot reach any suspension point; the run is
            // cancelled before it starts.
            state.record_error(format!(
                "Workflow timed out after {} seconds",
                self.settings.timeout_seconds
            ));
            state.workflow_status = WorkflowStatus::Cancelled;
        } else {
            let deadline = Instant::now() + timeout;
            match tokio::time::timeout(
                timeout,
                self.drive(&workflow_id, state, deadline, token.clone()),
            )
            .await
            {
                Ok(()) => {}
                Err(_elapsed) => {
                    let error = format!(
                        "Workflow timed out after {} seconds",
                        self.settings.timeout_seconds
                    );
                    tracing::error!(workflow_id = %workflow_id, "{}", error);
                    state.record_error(error);
                    state.workflow_status = WorkflowStatus::Failed;
                    self.cancel_children(&workflow_id);
                }
            }
        }

        let executions = self
            .executions
            .read()
            .expect("executions lock")
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default();
        result.phases_executed = executions.iter().map(|e| e.phase.as_str().to_string()).collect();
        result.metrics = WorkflowMetrics::from_executions(&executions);
        result.errors = state.errors.clone();
        result.final_output = Some(Self::final_output(state));
        let final_status = if state.workflow_status.is_terminal() {
            state.workflow_status
        } else {
            // Defensive: a non-terminal exit from the driver is an
            // internal invariant violation.
            state.record_error("workflow exited in non-terminal state");
            WorkflowStatus::Failed
        };
        result.finalize(final_status);

        self.results
            .write()
            .expect("results lock")
            .insert(workflow_id.clone(), result.clone());
        self.cancellations
            .write()
            .expect("cancellations lock")
            .remove(&workflow_id);
        self.current_children
            .write()
            .expect("current_children lock")
            .remove(&workflow_id);
        tracing::info!(
            workflow_id = %workflow_id,
            status = result.status.as_str(),
            phases = result.phases_executed.len(),
            "Workflow finished"
        );
        result
    }

    fn final_output(state: &WorkflowState) -> ContextMap {
        let mut output = ContextMap::new();
        let code = state
            .optimized_code
            .clone()
            .or_else(|| state.generated_code.clone());
        output.insert("generated_code".into(), json!(code));
        output.insert("test_results".into(), json!(state.test_results));
        output.insert("quality_assessment".into(), json!(state.quality_assessment));
        output.insert("selected_plan".into(), json!(state.selected_plan));
        output
    }

    /// The graph driver: evaluates the current phase, dispatches it, and
    /// follows unconditional or guarded edges until a terminal status.
    async fn drive(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: CancellationToken,
    ) {
        while !state.workflow_status.is_terminal() {
            let phase = state.current_phase;
            let next = match phase {
                Phase::RepositoryAnalysis => {
                    self.run_repository_analysis(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::PlanningFanOut => {
                    self.run_planning_fan_out(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::PlanSynthesis => {
                    self.run_plan_synthesis(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::CodeGeneration => {
                    self.run_code_generation(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::Debugging => {
                    self.run_debugging(workflow_id, state, deadline, &token).await
                }
                Phase::Optimization => {
                    self.run_optimization(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::QualityAssessment => {
                    self.run_quality_assessment(workflow_id, state, deadline, &token)
                        .await
                }
                Phase::HumanApproval => self.run_human_approval(workflow_id, state).await,
                Phase::Finalization => self.run_finalization(workflow_id, state).await,
                // The planning branches are driven inside the fan-out
                // region and never appear as the engine's current phase.
                Phase::CuttingEdgePlanning | Phase::ConservativePlanning => {
                    state.record_error(format!("unexpected current phase {phase}"));
                    state.workflow_status = WorkflowStatus::Failed;
                    None
                }
            };

            match next {
                Some(next_phase) => state.current_phase = next_phase,
                None => break,
            }
        }
    }

    // ========================================================================
    // Phase handlers. Each returns the next phase, or None on terminal.
    // ========================================================================

    async fn run_repository_analysis(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = state.task_context.clone();
        context.insert("task_description".into(), json!(state.task_description));

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::RepositoryAnalysis,
                AgentRole::RepositoryAnalyst,
                TaskType::RepositoryAnalysis,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.relevant_files = output
                    .get("relevant_files")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                state.code_patterns = output
                    .get("code_patterns")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                state.record_assignment(Phase::RepositoryAnalysis, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                state.repository_analysis = Some(output);
                self.checkpoint(workflow_id, Phase::RepositoryAnalysis, state).await;
                Some(Phase::PlanningFanOut)
            }
            Err(err) => self.fail_workflow(state, Phase::RepositoryAnalysis, err),
        }
    }

    /// Launch both planning branches concurrently and join them. The
    /// synthesis phase is reachable as long as at least one branch
    /// produced a plan; the workflow fails only when both did.
    async fn run_planning_fan_out(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut planning_context = state.task_context.clone();
        planning_context.insert("task_description".into(), json!(state.task_description));
        if let Some(analysis) = &state.repository_analysis {
            planning_context.insert("repository_analysis".into(), json!(analysis));
        }
        planning_context.insert("relevant_files".into(), json!(state.relevant_files));

        let mut cutting_context = planning_context.clone();
        cutting_context.insert("planner_type".into(), json!("cutting_edge"));
        let mut conservative_context = planning_context;
        conservative_context.insert("planner_type".into(), json!("conservative"));

        let (cutting, conservative) = tokio::join!(
            self.dispatch_phase(
                workflow_id,
                state,
                Phase::CuttingEdgePlanning,
                AgentRole::CuttingEdgePlanner,
                TaskType::TaskPlanning,
                cutting_context,
                deadline,
                token,
            ),
            self.dispatch_phase(
                workflow_id,
                state,
                Phase::ConservativePlanning,
                AgentRole::ConservativePlanner,
                TaskType::TaskPlanning,
                conservative_context,
                deadline,
                token,
            ),
        );

        if matches!(cutting, Err(DomainError::Cancelled(_)))
            || matches!(conservative, Err(DomainError::Cancelled(_)))
        {
            return self.cancel_workflow_state(state);
        }

        match cutting {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.record_assignment(Phase::CuttingEdgePlanning, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                state.cutting_edge_plan = Some(output);
            }
            Err(err) => state.record_error(format!("cutting_edge_planning: {err}")),
        }
        match conservative {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.record_assignment(Phase::ConservativePlanning, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                state.conservative_plan = Some(output);
            }
            Err(err) => state.record_error(format!("conservative_planning: {err}")),
        }

        if state.cutting_edge_plan.is_none() && state.conservative_plan.is_none() {
            state.workflow_status = WorkflowStatus::Failed;
            tracing::error!(workflow_id = %workflow_id, "Both planning branches failed");
            return None;
        }
        self.checkpoint(workflow_id, Phase::PlanningFanOut, state).await;
        Some(Phase::PlanSynthesis)
    }

    async fn run_plan_synthesis(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = ContextMap::new();
        context.insert("task_description".into(), json!(state.task_description));
        if let Some(plan) = &state.cutting_edge_plan {
            context.insert("cutting_edge_plan".into(), json!(plan));
        }
        if let Some(plan) = &state.conservative_plan {
            context.insert("conservative_plan".into(), json!(plan));
        }
        if let Some(analysis) = &state.repository_analysis {
            context.insert("repository_analysis".into(), json!(analysis));
        }

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::PlanSynthesis,
                AgentRole::SynthesisPlanner,
                TaskType::PlanSynthesis,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.record_assignment(Phase::PlanSynthesis, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                state.synthesis_plan = Some(output.clone());
                state.selected_plan = Some(output);
                self.checkpoint(workflow_id, Phase::PlanSynthesis, state).await;
                Some(Phase::CodeGeneration)
            }
            Err(err) => self.fail_workflow(state, Phase::PlanSynthesis, err),
        }
    }

    async fn run_code_generation(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = ContextMap::new();
        context.insert("task_description".into(), json!(state.task_description));
        if let Some(plan) = &state.selected_plan {
            context.insert("selected_plan".into(), json!(plan));
        }
        if let Some(analysis) = &state.repository_analysis {
            context.insert("repository_analysis".into(), json!(analysis));
        }
        context.insert("relevant_files".into(), json!(state.relevant_files));
        context.insert("code_patterns".into(), json!(state.code_patterns));

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::CodeGeneration,
                AgentRole::CodeGenerator,
                TaskType::CodeGeneration,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.generated_code = output
                    .get("code")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                state.record_assignment(Phase::CodeGeneration, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                self.checkpoint(workflow_id, Phase::CodeGeneration, state).await;
                match should_debug(state) {
                    DebugRoute::Optimize => Some(Phase::Optimization),
                    DebugRoute::Debug => Some(Phase::Debugging),
                }
            }
            Err(err) => self.fail_workflow(state, Phase::CodeGeneration, err),
        }
    }

    /// The debugging phase sits inside the retry region: its failures do
    /// not end the workflow directly; the retry conditional decides.
    async fn run_debugging(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = ContextMap::new();
        context.insert("task_description".into(), json!(state.task_description));
        if let Some(code) = &state.generated_code {
            context.insert("generated_code".into(), json!(code));
        }

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::Debugging,
                AgentRole::Debugger,
                TaskType::Debugging,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                // A debug pass that still carries an error marker has not
                // produced a usable artifact; leaving debugged_code unset
                // routes the retry conditional back to generation.
                if let Some(code) = output.get("debugged_code").and_then(|v| v.as_str()) {
                    if !code.to_lowercase().contains("error") {
                        state.debugged_code = Some(code.to_string());
                    }
                }
                state.record_assignment(Phase::Debugging, &agent_id, serde_json::to_value(&output).unwrap_or_default());
            }
            Err(DomainError::Cancelled(reason)) => {
                state.record_error(format!("debugging: {reason}"));
                return self.cancel_workflow_state(state);
            }
            Err(err) => state.record_error(format!("debugging: {err}")),
        }
        self.checkpoint(workflow_id, Phase::Debugging, state).await;

        match should_retry(state, self.settings.max_retries) {
            RetryRoute::Fail => {
                state.record_error(format!(
                    "debug retries exhausted after {} attempts",
                    state.retry_count
                ));
                state.workflow_status = WorkflowStatus::Failed;
                None
            }
            RetryRoute::Optimize => Some(Phase::Optimization),
            RetryRoute::Retry => {
                state.retry_count += 1;
                tracing::info!(
                    workflow_id = %workflow_id,
                    retry = state.retry_count,
                    max = self.settings.max_retries,
                    "Retrying code generation after debug"
                );
                Some(Phase::CodeGeneration)
            }
        }
    }

    async fn run_optimization(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = ContextMap::new();
        context.insert("task_description".into(), json!(state.task_description));
        if let Some(code) = state.debugged_code.as_ref().or(state.generated_code.as_ref()) {
            context.insert("debugged_code".into(), json!(code));
        }

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::Optimization,
                AgentRole::Optimizer,
                TaskType::Optimization,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.optimized_code = output
                    .get("optimized_code")
                    .and_then(|v| v.as_str())
                    .map(ToString::to_string);
                state.record_assignment(Phase::Optimization, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                self.checkpoint(workflow_id, Phase::Optimization, state).await;
                Some(Phase::QualityAssessment)
            }
            Err(err) => self.fail_workflow(state, Phase::Optimization, err),
        }
    }

    async fn run_quality_assessment(
        &self,
        workflow_id: &str,
        state: &mut WorkflowState,
        deadline: Instant,
        token: &CancellationToken,
    ) -> Option<Phase> {
        let mut context = ContextMap::new();
        context.insert("task_description".into(), json!(state.task_description));
        if let Some(code) = state.optimized_code.as_ref().or(state.generated_code.as_ref()) {
            context.insert("optimized_code".into(), json!(code));
        }

        match self
            .dispatch_phase(
                workflow_id,
                state,
                Phase::QualityAssessment,
                AgentRole::QualityAssessor,
                TaskType::QualityAssessment,
                context,
                deadline,
                token,
            )
            .await
        {
            Ok(PhaseOutcome { agent_id, output }) => {
                state.quality_assessment = output
                    .get("assessment")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                state.requires_human_approval = output
                    .get("requires_human_approval")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(self.settings.enable_human_approval);
                state.record_assignment(Phase::QualityAssessment, &agent_id, serde_json::to_value(&output).unwrap_or_default());
                self.checkpoint(workflow_id, Phase::QualityAssessment, state).await;
                if state.requires_human_approval {
                    Some(Phase::HumanApproval)
                } else {
                    Some(Phase::Finalization)
                }
            }
            Err(err) => self.fail_workflow(state, Phase::QualityAssessment, err),
        }
    }

    /// Consult the approval gate. Approved continues to finalization;
    /// rejected loops back to plan synthesis; anything else cancels.
    async fn run_human_approval(&self, workflow_id: &str, state: &mut WorkflowState) -> Option<Phase> {
        let mut record = PhaseExecution::begin(Phase::HumanApproval);
        state.workflow_status = WorkflowStatus::RequiresApproval;
        let decision = match self.approval_gate.decide(workflow_id, state).await {
            Ok(decision) => decision,
            Err(err) => {
                record.fail(err.to_string());
                self.push_execution(workflow_id, record);
                state.record_error(format!("human_approval: {err}"));
                state.workflow_status = WorkflowStatus::Failed;
                return None;
            }
        };
        state.approval_status = Some(decision);
        record.complete();
        self.push_execution(workflow_id, record);
        self.checkpoint(workflow_id, Phase::HumanApproval, state).await;
        tracing::info!(workflow_id = %workflow_id, decision = ?decision, "Approval decision received");

        match decision {
            ApprovalStatus::Approved => {
                state.workflow_status = WorkflowStatus::Running;
                Some(Phase::Finalization)
            }
            ApprovalStatus::Rejected => {
                // Loop back for a fresh synthesis round. Accumulated
                // outputs stay in state; the next pass overwrites them.
                state.workflow_status = WorkflowStatus::Running;
                state.requires_human_approval = false;
                Some(Phase::PlanSynthesis)
            }
            ApprovalStatus::Cancelled | ApprovalStatus::Pending => {
                state.record_error("workflow cancelled at approval gate");
                state.workflow_status = WorkflowStatus::Cancelled;
                None
            }
        }
    }

    async fn run_finalization(&self, workflow_id: &str, state: &mut WorkflowState) -> Option<Phase> {
        let mut record = PhaseExecution::begin(Phase::Finalization);
        state.workflow_status = WorkflowStatus::Completed;
        record.complete();
        self.push_execution(workflow_id, record);
        self.checkpoint(workflow_id, Phase::Finalization, state).await;
        None
    }

    // ========================================================================
    // Dispatch plumbing
    // ========================================================================

    /// Dispatch one phase through the bus: resolve an agent by role,
    /// build the child task carrying the phase's context subset, send a
    /// task assignment, and await the collected result within the
    /// remaining workflow budget.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_phase(
        &self,
        workflow_id: &str,
        state: &WorkflowState,
        phase: Phase,
        role: AgentRole,
        task_type: TaskType,
        context: ContextMap,
        deadline: Instant,
        token: &CancellationToken,
    ) -> DomainResult<PhaseOutcome> {
        let mut record = PhaseExecution::begin(phase);
        record.retry_count = state.retry_count;

        let outcome = self
            .dispatch_inner(workflow_id, state, phase, role, task_type, context, deadline, token, &mut record)
            .await;
        match &outcome {
            Ok(_) => record.complete(),
            Err(err) => record.fail(err.to_string()),
        }
        let agent_id = record.agent_id.clone().unwrap_or_default();
        self.push_execution(workflow_id, record);
        outcome.map(|output| PhaseOutcome { agent_id, output })
    }

    #[allow(clippy::too_many_arguments)]
    async fn dispatch_inner(
        &self,
        workflow_id: &str,
        state: &WorkflowState,
        phase: Phase,
        role: AgentRole,
        task_type: TaskType,
        context: ContextMap,
        deadline: Instant,
        token: &CancellationToken,
        record: &mut PhaseExecution,
    ) -> DomainResult<ContextMap> {
        let agent = self.bus.find_agent_by_role(role).ok_or_else(|| {
            DomainError::AgentNotFound(format!("no agent registered for role {role}"))
        })?;
        record.agent_id = Some(agent.id().to_string());

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(DomainError::DeadlineExceeded(format!(
                "no budget left for phase {phase}"
            )));
        }

        let child = Task::new(
            format!("{phase}: {}", state.task_description),
            state.task_description.clone(),
            task_type,
        )
        .with_parent(state.task_id)
        .with_priority(TaskPriority::High)
        .with_context(context);
        let child_id = child.id;
        self.track_child(workflow_id, child_id);

        self.bus
            .coordinate(&child, Some(&[agent.id().to_string()]))?;
        tracing::debug!(
            workflow_id = %workflow_id,
            phase = %phase,
            agent_id = %agent.id(),
            child_task = %child_id,
            "Phase dispatched"
        );

        let responses = tokio::select! {
            () = token.cancelled() => {
                self.bus.cancel_task(child_id);
                self.untrack_child(workflow_id, child_id);
                return Err(DomainError::Cancelled(format!("phase {phase} cancelled")));
            }
            responses = self.bus.collect(child_id, remaining) => responses,
        };
        self.untrack_child(workflow_id, child_id);

        let response = responses.into_iter().next().ok_or_else(|| {
            DomainError::ExecutionFailed(format!("phase {phase} produced no response"))
        })?;
        match response.status {
            ResponseStatus::Completed => Ok(response.result.unwrap_or_default()),
            ResponseStatus::Timeout => {
                self.bus.cancel_task(child_id);
                Err(DomainError::DeadlineExceeded(format!(
                    "phase {phase} timed out"
                )))
            }
            ResponseStatus::Cancelled => {
                Err(DomainError::Cancelled(format!("phase {phase} cancelled")))
            }
            ResponseStatus::Failed => Err(DomainError::ExecutionFailed(
                response
                    .error
                    .unwrap_or_else(|| format!("phase {phase} failed")),
            )),
        }
    }

    /// Standard failure policy for phases outside the retry region:
    /// record the error and end the workflow as failed, or cancelled if
    /// the failure was a cancellation.
    fn fail_workflow(
        &self,
        state: &mut WorkflowState,
        phase: Phase,
        err: DomainError,
    ) -> Option<Phase> {
        if matches!(err, DomainError::Cancelled(_)) {
            state.record_error(format!("{phase}: {err}"));
            return self.cancel_workflow_state(state);
        }
        tracing::error!(phase = %phase, error = %err, "Phase failed");
        state.record_error(format!("{phase}: {err}"));
        state.workflow_status = WorkflowStatus::Failed;
        None
    }

    fn cancel_workflow_state(&self, state: &mut WorkflowState) -> Option<Phase> {
        state.workflow_status = WorkflowStatus::Cancelled;
        None
    }

    async fn checkpoint(&self, workflow_id: &str, phase: Phase, state: &WorkflowState) {
        if let Err(err) = self.checkpointer.put(workflow_id, phase, state).await {
            // Checkpoint loss degrades resumability, not the run itself.
            tracing::warn!(workflow_id = %workflow_id, phase = %phase, error = %err, "Checkpoint write failed");
        }
    }

    fn push_execution(&self, workflow_id: &str, record: PhaseExecution) {
        self.executions
            .write()
            .expect("executions lock")
            .entry(workflow_id.to_string())
            .or_default()
            .push(record);
    }

    fn track_child(&self, workflow_id: &str, child_id: Uuid) {
        self.current_children
            .write()
            .expect("current_children lock")
            .entry(workflow_id.to_string())
            .or_default()
            .push(child_id);
    }

    fn untrack_child(&self, workflow_id: &str, child_id: Uuid) {
        if let Some(children) = self
            .current_children
            .write()
            .expect("current_children lock")
            .get_mut(workflow_id)
        {
            children.retain(|id| *id != child_id);
        }
    }

    fn cancel_children(&self, workflow_id: &str) {
        let children: Vec<Uuid> = self
            .current_children
            .read()
            .expect("current_children lock")
            .get(workflow_id)
            .cloned()
            .unwrap_or_default();
        for child_id in children {
            self.bus.cancel_task(child_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::Task;

    fn state_with(generated: Option<&str>, debugged: Option<&str>, retries: u32) -> WorkflowState {
        let task = Task::new("t", "d", TaskType::CodeGeneration);
        let mut state = WorkflowState::for_task(&task);
        state.generated_code = generated.map(ToString::to_string);
        state.debugged_code = debugged.map(ToString::to_string);
        state.retry_count = retries;
        state
    }

    #[test]
    fn test_should_debug_routes() {
        assert_eq!(should_debug(&state_with(None, None, 0)), DebugRoute::Debug);
        assert_eq!(
            should_debug(&state_with(Some("fn main() { Error: bad }"), None, 0)),
            DebugRoute::Debug
        );
        assert_eq!(
            should_debug(&state_with(Some("fn main() {}"), None, 0)),
            DebugRoute::Optimize
        );
    }

    #[test]
    fn test_should_retry_routes() {
        // Retries exhausted
        assert_eq!(
            should_retry(&state_with(Some("x"), None, 3), 3),
            RetryRoute::Fail
        );
        // Debugged artifact available
        assert_eq!(
            should_retry(&state_with(Some("x"), Some("fixed"), 0), 3),
            RetryRoute::Optimize
        );
        // Otherwise retry
        assert_eq!(
            should_retry(&state_with(Some("x"), None, 1), 3),
            RetryRoute::Retry
        );
        // Zero retries allowed fails immediately
        assert_eq!(
            should_retry(&state_with(Some("x"), None, 0), 0),
            RetryRoute::Fail
        );
    }
}
