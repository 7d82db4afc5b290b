//! Swarm manager.
//!
//! Owns the agent roster, routes incoming requests to the right
//! execution path (direct single-agent, workflow, or multi-planner
//! fan-out), tracks task result records in a bounded history, and tears
//! the swarm down cleanly.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::agents::analyst::AnalystExecutor;
use crate::agents::generator::{GeneratorExecutor, GeneratorMode};
use crate::agents::planner::{PlannerExecutor, PlannerKind};
use crate::agents::{AgentRole, ResourceLimits, SwarmAgent};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::SwarmConfig;
use crate::domain::models::task::{ContextMap, Task, TaskPriority, TaskStatus, TaskType};
use crate::domain::models::workflow::WorkflowStatus;
use crate::domain::ports::approval::{ApprovalGate, StaticApprovalGate};
use crate::domain::ports::audit::{AuditRecord, AuditSink, NullAuditSink};
use crate::domain::ports::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use crate::domain::ports::language_model::LanguageModel;
use crate::domain::ports::repository::RepositoryFetcher;
use crate::domain::ports::retrieval::RetrievalEngine;

use super::message_bus::MessageBus;
use super::request_parser::parse_request;
use super::workflow_engine::WorkflowEngine;

/// Bound on retained task records.
const TASK_HISTORY_BOUND: usize = 100;

/// A request submitted to the swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmRequest {
    pub objective: String,
    /// Explicit type; derived from the objective text when absent
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub context: ContextMap,
    pub tenant: Option<String>,
    pub actor: Option<String>,
}

impl SwarmRequest {
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            objective: objective.into(),
            task_type: None,
            priority: None,
            context: ContextMap::new(),
            tenant: None,
            actor: None,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Result record tracked per submitted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub result: ContextMap,
    pub error: Option<String>,
    pub workflow_id: Option<String>,
    pub processing_time_ms: f64,
    pub agents_involved: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            result: ContextMap::new(),
            error: None,
            workflow_id: None,
            processing_time_ms: 0.0,
            agents_involved: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Aggregate swarm status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStatus {
    pub initialized: bool,
    pub initialization_error: Option<String>,
    pub agents: usize,
    pub active_tasks: usize,
}

/// Collaborators injected into the manager.
pub struct SwarmCollaborators {
    pub repository: Arc<dyn RepositoryFetcher>,
    pub language_model: Arc<dyn LanguageModel>,
    pub retrieval: Option<Arc<dyn RetrievalEngine>>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub approval_gate: Arc<dyn ApprovalGate>,
    pub audit: Arc<dyn AuditSink>,
}

impl SwarmCollaborators {
    /// Collaborator set with in-memory checkpoints, an approving gate,
    /// and no audit store.
    pub fn new(
        repository: Arc<dyn RepositoryFetcher>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            repository,
            language_model,
            retrieval: None,
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            approval_gate: Arc::new(StaticApprovalGate::approving()),
            audit: Arc::new(NullAuditSink),
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalEngine>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval_gate = gate;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

/// Main manager for the agent swarm.
pub struct SwarmManager {
    config: SwarmConfig,
    collaborators: SwarmCollaborators,
    bus: Arc<MessageBus>,
    engine: Arc<WorkflowEngine>,
    records: StdRwLock<HashMap<Uuid, TaskRecord>>,
    record_order: StdMutex<VecDeque<Uuid>>,
    submissions: StdMutex<Vec<JoinHandle<()>>>,
    workflow_slots: Arc<Semaphore>,
    initialized: AtomicBool,
    initialization_error: StdRwLock<Option<String>>,
    /// Back-reference for spawning routed execution tasks.
    self_ref: Weak<SwarmManager>,
}

impl SwarmManager {
    pub fn new(config: SwarmConfig, collaborators: SwarmCollaborators) -> Arc<Self> {
        let bus = MessageBus::new(config.bus.clone());
        let engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&bus),
            Arc::clone(&collaborators.checkpoints),
            Arc::clone(&collaborators.approval_gate),
            config.workflow.clone(),
        ));
        let workflow_slots = Arc::new(Semaphore::new(config.workflow.max_concurrent_workflows.max(1)));
        Arc::new_cyclic(|self_ref| Self {
            config,
            collaborators,
            bus,
            engine,
            records: StdRwLock::new(HashMap::new()),
            record_order: StdMutex::new(VecDeque::new()),
            submissions: StdMutex::new(Vec::new()),
            workflow_slots,
            initialized: AtomicBool::new(false),
            initialization_error: StdRwLock::new(None),
            self_ref: self_ref.clone(),
        })
    }

    pub fn bus(&self) -> Arc<MessageBus> {
        Arc::clone(&self.bus)
    }

    pub fn engine(&self) -> Arc<WorkflowEngine> {
        Arc::clone(&self.engine)
    }

    /// Initialize the swarm: construct the default roster, register it
    /// with the bus, and start background delivery. Idempotent; a failed
    /// initialization is captured and makes later submissions fail fast.
    pub fn init(&self) -> DomainResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.build_roster() {
            Ok(agents) => {
                for agent in agents {
                    agent.start();
                    self.bus.register_agent(agent);
                }
                self.bus.start();
                self.initialized.store(true, Ordering::SeqCst);
                tracing::info!(agents = self.bus.agents().len(), "Swarm manager initialized");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                *self
                    .initialization_error
                    .write()
                    .expect("initialization_error lock") = Some(message.clone());
                tracing::error!(error = %message, "Swarm initialization failed");
                Err(err)
            }
        }
    }

    fn agent_limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_concurrent_tasks: self.config.agents.max_concurrent_tasks,
            memory_limit_mb: 512,
            task_timeout: Duration::from_secs(self.config.agents.task_timeout_seconds),
        }
    }

    /// The default roster: one analyst, the three planner variants, and
    /// the four generation-side workers.
    fn build_roster(&self) -> DomainResult<Vec<Arc<SwarmAgent>>> {
        let limits = self.agent_limits();
        let conversation_bound = self.config.agents.conversation_history_bound;
        if conversation_bound == 0 {
            return Err(DomainError::ValidationFailed(
                "conversation_history_bound must be positive".into(),
            ));
        }

        let analyst = Arc::new(
            AnalystExecutor::new(Arc::clone(&self.collaborators.repository))
                .with_max_files(self.config.agents.analyst_max_files),
        );

        let planner = |kind: PlannerKind| {
            let mut executor = PlannerExecutor::new(kind);
            if let Some(retrieval) = &self.collaborators.retrieval {
                executor = executor.with_retrieval(Arc::clone(retrieval));
            }
            Arc::new(executor)
        };
        let cutting = planner(PlannerKind::CuttingEdge);
        let conservative = planner(PlannerKind::Conservative);
        let synthesis = planner(PlannerKind::Synthesis);

        let llm = &self.collaborators.language_model;
        let generator = Arc::new(GeneratorExecutor::new(GeneratorMode::Generate, Arc::clone(llm)));
        let debugger = Arc::new(GeneratorExecutor::new(GeneratorMode::Debug, Arc::clone(llm)));
        let optimizer = Arc::new(GeneratorExecutor::new(GeneratorMode::Optimize, Arc::clone(llm)));
        let assessor = Arc::new(
            GeneratorExecutor::new(GeneratorMode::Assess, Arc::clone(llm))
                .with_approval_requests(self.config.workflow.enable_human_approval),
        );

        Ok(vec![
            SwarmAgent::new(AgentRole::RepositoryAnalyst, "Repository Analyst", analyst, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::CuttingEdgePlanner, "Cutting-Edge Planner", cutting, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::ConservativePlanner, "Conservative Planner", conservative, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::SynthesisPlanner, "Synthesis Planner", synthesis, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::CodeGenerator, "Code Generator", generator, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::Debugger, "Debugger", debugger, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::Optimizer, "Optimizer", optimizer, limits.clone(), conversation_bound),
            SwarmAgent::new(AgentRole::QualityAssessor, "Quality Assessor", assessor, limits, conversation_bound),
        ])
    }

    fn ensure_ready(&self) -> DomainResult<()> {
        if let Some(error) = self
            .initialization_error
            .read()
            .expect("initialization_error lock")
            .as_ref()
        {
            return Err(DomainError::ExecutionFailed(format!(
                "swarm initialization failed: {error}"
            )));
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(DomainError::ExecutionFailed(
                "swarm manager not initialized".into(),
            ));
        }
        Ok(())
    }

    /// Submit a request. Returns the new task id immediately; execution
    /// proceeds in the background and updates the task record.
    pub fn submit(&self, request: SwarmRequest) -> DomainResult<Uuid> {
        self.ensure_ready()?;

        let parsed = parse_request(&request.objective);
        let task_type = request.task_type.unwrap_or(parsed.task_type);
        let priority = request.priority.unwrap_or(parsed.priority);

        let mut context = request.context.clone();
        context.insert("original_message".into(), json!(request.objective));
        context.insert("parsed_keywords".into(), json!(parsed.keywords));

        let title = format!(
            "Swarm task: {}",
            request.objective.chars().take(50).collect::<String>()
        );
        let task = Task::new(title, request.objective.clone(), task_type)
            .with_priority(priority)
            .with_context(context);
        let task_id = task.id;

        self.insert_record(TaskRecord::new(task_id));
        self.audit_submission(&request, &task);

        let Some(manager) = self.self_ref.upgrade() else {
            return Err(DomainError::ExecutionFailed(
                "swarm manager dropped".into(),
            ));
        };
        let handle = tokio::spawn(async move {
            manager.execute_routed(task).await;
        });
        self.submissions.lock().expect("submissions lock").push(handle);
        tracing::info!(task_id = %task_id, task_type = task_type.as_str(), "Task submitted");
        Ok(task_id)
    }

    /// Current status of a task.
    pub fn status(&self, task_id: Uuid) -> Option<TaskStatus> {
        self.records
            .read()
            .expect("records lock")
            .get(&task_id)
            .map(|record| record.status)
    }

    /// Full record of a task.
    pub fn record(&self, task_id: Uuid) -> Option<TaskRecord> {
        self.records
            .read()
            .expect("records lock")
            .get(&task_id)
            .cloned()
    }

    /// Result payload of a completed task.
    pub fn result(&self, task_id: Uuid) -> Option<ContextMap> {
        self.records
            .read()
            .expect("records lock")
            .get(&task_id)
            .filter(|record| record.status == TaskStatus::Completed)
            .map(|record| record.result.clone())
    }

    /// All retained records, newest last.
    pub fn records(&self) -> Vec<TaskRecord> {
        let records = self.records.read().expect("records lock");
        self.record_order
            .lock()
            .expect("record_order lock")
            .iter()
            .filter_map(|id| records.get(id).cloned())
            .collect()
    }

    /// Aggregate status for health reporting.
    pub fn swarm_status(&self) -> SwarmStatus {
        let records = self.records.read().expect("records lock");
        SwarmStatus {
            initialized: self.initialized.load(Ordering::SeqCst),
            initialization_error: self
                .initialization_error
                .read()
                .expect("initialization_error lock")
                .clone(),
            agents: self.bus.agents().len(),
            active_tasks: records
                .values()
                .filter(|record| !record.status.is_terminal())
                .count(),
        }
    }

    /// Await completion of a submitted task, polling its record.
    pub async fn wait_for(&self, task_id: Uuid, timeout: Duration) -> Option<TaskRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.record(task_id) {
                if record.status.is_terminal() {
                    return Some(record);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return self.record(task_id);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Shut the swarm down: cancel workflows, stop every agent, stop the
    /// bus, and cancel any record still in flight.
    pub async fn shutdown(&self) {
        tracing::info!("Swarm manager shutting down");
        self.engine.cancel_all();
        for agent in self.bus.agents() {
            agent.stop().await;
        }

        let handles: Vec<JoinHandle<()>> = self
            .submissions
            .lock()
            .expect("submissions lock")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        self.bus.shutdown().await;

        let mut records = self.records.write().expect("records lock");
        for record in records.values_mut() {
            if !record.status.is_terminal() {
                record.status = TaskStatus::Cancelled;
                record.error = Some("cancelled by shutdown".to_string());
                record.completed_at = Some(Utc::now());
            }
        }
        self.initialized.store(false, Ordering::SeqCst);
    }

    // ========================================================================
    // Routing
    // ========================================================================

    async fn execute_routed(&self, task: Task) {
        let task_id = task.id;
        let started = Utc::now();
        self.update_record(task_id, |record| record.status = TaskStatus::InProgress);

        let outcome = match task.task_type {
            TaskType::RepositoryAnalysis | TaskType::CodeAnalysis => self.run_direct(task).await,
            TaskType::CodeGeneration | TaskType::FeatureImplementation | TaskType::BugFix => {
                self.run_workflow(task).await
            }
            TaskType::Planning | TaskType::ArchitectureDesign => self.run_planning(task).await,
            // Unknown routes default to repository analysis
            _ => self.run_direct(task).await,
        };

        let elapsed_ms = (Utc::now() - started).num_milliseconds() as f64;
        self.update_record(task_id, |record| {
            record.processing_time_ms = elapsed_ms;
            record.completed_at = Some(Utc::now());
            match outcome {
                RouteOutcome::Completed {
                    ref result,
                    ref agents,
                    ref workflow_id,
                } => {
                    record.status = TaskStatus::Completed;
                    record.result = result.clone();
                    record.agents_involved = agents.clone();
                    record.workflow_id = workflow_id.clone();
                }
                RouteOutcome::Failed {
                    ref error,
                    ref workflow_id,
                } => {
                    record.status = TaskStatus::Failed;
                    record.error = Some(error.clone());
                    record.workflow_id = workflow_id.clone();
                }
                RouteOutcome::Cancelled { ref workflow_id } => {
                    record.status = TaskStatus::Cancelled;
                    record.error = Some("cancelled".to_string());
                    record.workflow_id = workflow_id.clone();
                }
            }
        });
        self.audit_completion(task_id);
    }

    /// Direct single-agent path for analysis tasks.
    async fn run_direct(&self, task: Task) -> RouteOutcome {
        let Some(analyst) = self.bus.find_agent_by_role(AgentRole::RepositoryAnalyst) else {
            return RouteOutcome::Failed {
                error: "repository analyst not available".into(),
                workflow_id: None,
            };
        };
        // Route through the analyst regardless of the original type tag;
        // unknown types default here with an analysis task type.
        let mut task = task;
        if !matches!(
            task.task_type,
            TaskType::RepositoryAnalysis | TaskType::CodeAnalysis
        ) {
            task.task_type = TaskType::RepositoryAnalysis;
        }

        let done = analyst.process(task).await;
        match done.status {
            TaskStatus::Completed => RouteOutcome::Completed {
                result: done.result.unwrap_or_default(),
                agents: vec![analyst.id().to_string()],
                workflow_id: None,
            },
            TaskStatus::Cancelled => RouteOutcome::Cancelled { workflow_id: None },
            _ => RouteOutcome::Failed {
                error: done
                    .error
                    .unwrap_or_else(|| "repository analysis failed".into()),
                workflow_id: None,
            },
        }
    }

    /// Full code-generation workflow path.
    async fn run_workflow(&self, task: Task) -> RouteOutcome {
        let _permit = match Arc::clone(&self.workflow_slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return RouteOutcome::Failed {
                    error: "workflow slots closed".into(),
                    workflow_id: None,
                }
            }
        };
        let workflow = self.engine.execute(&task).await;
        let workflow_id = Some(workflow.workflow_id.clone());
        let agents: Vec<String> = {
            let mut seen = Vec::new();
            for execution in self.engine.executions(&workflow.workflow_id) {
                if let Some(agent_id) = execution.agent_id {
                    if !seen.contains(&agent_id) {
                        seen.push(agent_id);
                    }
                }
            }
            seen
        };

        match workflow.status {
            WorkflowStatus::Completed => {
                let mut result = workflow.final_output.clone().unwrap_or_default();
                result.insert("workflow_id".into(), json!(workflow.workflow_id));
                result.insert(
                    "phases_executed".into(),
                    json!(workflow.phases_executed),
                );
                result.insert(
                    "metrics".into(),
                    serde_json::to_value(&workflow.metrics).unwrap_or_default(),
                );
                RouteOutcome::Completed {
                    result,
                    agents,
                    workflow_id,
                }
            }
            WorkflowStatus::Cancelled => RouteOutcome::Cancelled { workflow_id },
            _ => RouteOutcome::Failed {
                error: if workflow.errors.is_empty() {
                    "workflow failed".to_string()
                } else {
                    workflow.errors.join("; ")
                },
                workflow_id,
            },
        }
    }

    /// Multi-planner fan-out path: run the divergent planners in
    /// parallel, then hand both plans to the synthesis planner.
    async fn run_planning(&self, task: Task) -> RouteOutcome {
        let cutting = self.bus.find_agent_by_role(AgentRole::CuttingEdgePlanner);
        let conservative = self.bus.find_agent_by_role(AgentRole::ConservativePlanner);
        let synthesis = self.bus.find_agent_by_role(AgentRole::SynthesisPlanner);
        let (Some(cutting), Some(conservative), Some(synthesis)) = (cutting, conservative, synthesis)
        else {
            return RouteOutcome::Failed {
                error: "planning agents not available".into(),
                workflow_id: None,
            };
        };

        let child = |suffix: &str| {
            Task::new(
                format!("Planning ({suffix}): {}", task.title),
                task.description.clone(),
                TaskType::TaskPlanning,
            )
            .with_parent(task.id)
            .with_priority(task.priority)
            .with_context(task.context.clone())
        };

        let (cutting_done, conservative_done) = tokio::join!(
            cutting.process(child("cutting_edge")),
            conservative.process(child("conservative")),
        );

        let mut agents = vec![cutting.id().to_string(), conservative.id().to_string()];
        let mut plans = ContextMap::new();
        let mut synthesis_context = task.context.clone();
        if let (TaskStatus::Completed, Some(result)) =
            (cutting_done.status, cutting_done.result.clone())
        {
            synthesis_context.insert("cutting_edge_plan".into(), json!(result));
            plans.insert("cutting_edge".into(), json!(result));
        }
        if let (TaskStatus::Completed, Some(result)) =
            (conservative_done.status, conservative_done.result.clone())
        {
            synthesis_context.insert("conservative_plan".into(), json!(result));
            plans.insert("conservative".into(), json!(result));
        }

        let synthesis_task = Task::new(
            format!("Planning (synthesis): {}", task.title),
            task.description.clone(),
            TaskType::PlanSynthesis,
        )
        .with_parent(task.id)
        .with_priority(task.priority)
        .with_context(synthesis_context);
        let synthesis_done = synthesis.process(synthesis_task).await;
        agents.push(synthesis.id().to_string());
        if let (TaskStatus::Completed, Some(result)) =
            (synthesis_done.status, synthesis_done.result.clone())
        {
            plans.insert("synthesis".into(), json!(result));
        }

        if plans.is_empty() {
            return RouteOutcome::Failed {
                error: "all planners failed".into(),
                workflow_id: None,
            };
        }
        let mut result = ContextMap::new();
        result.insert("total_plans".into(), json!(plans.len()));
        result.insert("plans".into(), json!(plans));
        RouteOutcome::Completed {
            result,
            agents,
            workflow_id: None,
        }
    }

    // ========================================================================
    // Records & audit
    // ========================================================================

    fn insert_record(&self, record: TaskRecord) {
        let task_id = record.task_id;
        let mut records = self.records.write().expect("records lock");
        let mut order = self.record_order.lock().expect("record_order lock");
        records.insert(task_id, record);
        order.push_back(task_id);
        while order.len() > TASK_HISTORY_BOUND {
            if let Some(oldest) = order.pop_front() {
                records.remove(&oldest);
            }
        }
    }

    fn update_record(&self, task_id: Uuid, update: impl FnOnce(&mut TaskRecord)) {
        if let Some(record) = self.records.write().expect("records lock").get_mut(&task_id) {
            update(record);
        }
    }

    fn audit_submission(&self, request: &SwarmRequest, task: &Task) {
        let record = AuditRecord::new(
            request.tenant.clone().unwrap_or_else(|| "default".into()),
            request.actor.clone().unwrap_or_else(|| "anonymous".into()),
            "swarm",
            "submit",
            json!({
                "task_id": task.id.to_string(),
                "task_type": task.task_type.as_str(),
                "objective": request.objective,
            }),
        );
        let audit = Arc::clone(&self.collaborators.audit);
        tokio::spawn(async move {
            if let Err(err) = audit.record(record).await {
                tracing::warn!(error = %err, "Audit write failed");
            }
        });
    }

    fn audit_completion(&self, task_id: Uuid) {
        let Some(record) = self.record(task_id) else {
            return;
        };
        let mut audit_record = AuditRecord::new("default", "swarm", "swarm", "task_finished", json!({
            "task_id": task_id.to_string(),
            "status": record.status.as_str(),
        }));
        if let Some(error) = &record.error {
            audit_record = audit_record.with_error(error.clone());
        } else {
            audit_record = audit_record.with_response(json!({
                "agents_involved": record.agents_involved,
            }));
        }
        let audit = Arc::clone(&self.collaborators.audit);
        tokio::spawn(async move {
            if let Err(err) = audit.record(audit_record).await {
                tracing::warn!(error = %err, "Audit write failed");
            }
        });
    }
}

enum RouteOutcome {
    Completed {
        result: ContextMap,
        agents: Vec<String>,
        workflow_id: Option<String>,
    },
    Failed {
        error: String,
        workflow_id: Option<String>,
    },
    Cancelled {
        workflow_id: Option<String>,
    },
}
