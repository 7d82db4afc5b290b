//! Shared fixtures for the integration suites: scripted collaborators,
//! harness builders, and roster helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use quorum::agents::analyst::AnalystExecutor;
use quorum::agents::generator::{GeneratorExecutor, GeneratorMode};
use quorum::agents::planner::{PlannerExecutor, PlannerKind};
use quorum::agents::{AgentRole, ResourceLimits, SwarmAgent, TaskExecutor};
use quorum::domain::errors::{DomainError, DomainResult};
use quorum::domain::models::config::{BusSettings, WorkflowSettings};
use quorum::domain::models::memory::AgentMemory;
use quorum::domain::models::task::{ContextMap, Task};
use quorum::domain::models::workflow::{ApprovalStatus, WorkflowState};
use quorum::domain::ports::approval::ApprovalGate;
use quorum::domain::ports::checkpoint::MemoryCheckpointStore;
use quorum::domain::ports::language_model::{Completion, CompletionRequest, LanguageModel};
use quorum::domain::ports::repository::{RepoEntry, RepositoryFetcher};
use quorum::services::message_bus::MessageBus;
use quorum::services::workflow_engine::WorkflowEngine;

/// Bus settings tuned for fast test polling.
pub fn fast_bus() -> BusSettings {
    BusSettings {
        history_bound: 1000,
        collect_timeout_seconds: 5,
        poll_interval_ms: 10,
        keepalive_interval_seconds: 60,
    }
}

/// Short agent limits so timeout paths stay fast.
pub fn fast_limits() -> ResourceLimits {
    ResourceLimits {
        max_concurrent_tasks: 3,
        memory_limit_mb: 512,
        task_timeout: Duration::from_secs(30),
    }
}

// ============================================================================
// Collaborator stubs
// ============================================================================

/// In-memory repository with a couple of small files.
pub struct StubRepo {
    pub files: Vec<(String, String)>,
}

impl StubRepo {
    pub fn sample() -> Arc<Self> {
        Arc::new(Self {
            files: vec![
                (
                    "src/service.py".to_string(),
                    "class Service:\n    async def run(self):\n        return 1\n".to_string(),
                ),
                (
                    "tests/test_service.py".to_string(),
                    "def test_run():\n    assert True\n".to_string(),
                ),
                ("README.md".to_string(), "# Service\nDocs\n".to_string()),
            ],
        })
    }
}

#[async_trait]
impl RepositoryFetcher for StubRepo {
    async fn list_tree(&self, _path: &str, _git_ref: &str) -> DomainResult<Vec<RepoEntry>> {
        Ok(self
            .files
            .iter()
            .map(|(path, content)| RepoEntry {
                path: path.clone(),
                size: content.len() as u64,
            })
            .collect())
    }

    async fn fetch_file(&self, path: &str) -> DomainResult<String> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| DomainError::ExecutionFailed(format!("missing file {path}")))
    }
}

/// Deterministic language model.
///
/// Scripted responses are popped per prompt template; when a template has
/// no scripted response left the model echoes the request content, which
/// makes the debug phase behave like "return the code unchanged".
pub struct ScriptedModel {
    scripts: StdMutex<HashMap<String, VecDeque<String>>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            scripts: StdMutex::new(HashMap::new()),
            delay: None,
        }
    }

    /// Model that echoes every request after a fixed delay.
    pub fn slow(delay: Duration) -> Self {
        Self {
            scripts: StdMutex::new(HashMap::new()),
            delay: Some(delay),
        }
    }

    pub fn script(self, template: &str, responses: &[&str]) -> Self {
        self.scripts.lock().unwrap().insert(
            template.to_string(),
            responses.iter().map(|r| (*r).to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> DomainResult<Completion> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.prompt_template)
            .and_then(VecDeque::pop_front);
        let summary = scripted.unwrap_or_else(|| request.content.clone());
        Ok(Completion {
            summary,
            model_used: request.model,
            provider: "scripted".to_string(),
            token_count: 1,
            processing_time_ms: 0,
            fallback_used: false,
        })
    }
}

/// Approval gate replaying a fixed decision sequence; the last decision
/// repeats once the script is exhausted.
pub struct ScriptedGate {
    decisions: StdMutex<VecDeque<ApprovalStatus>>,
    last: ApprovalStatus,
}

impl ScriptedGate {
    pub fn new(decisions: &[ApprovalStatus]) -> Self {
        let last = *decisions.last().unwrap_or(&ApprovalStatus::Approved);
        Self {
            decisions: StdMutex::new(decisions.iter().copied().collect()),
            last,
        }
    }
}

#[async_trait]
impl ApprovalGate for ScriptedGate {
    async fn decide(
        &self,
        _workflow_id: &str,
        _state: &WorkflowState,
    ) -> DomainResult<ApprovalStatus> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.last))
    }
}

/// Executor that always fails; used to break individual roster slots.
pub struct AlwaysFails;

#[async_trait]
impl TaskExecutor for AlwaysFails {
    async fn execute(&self, _task: &Task, _memory: &mut AgentMemory) -> DomainResult<ContextMap> {
        Err(DomainError::ExecutionFailed("planner exploded".into()))
    }
}

// ============================================================================
// Engine harness
// ============================================================================

pub struct EngineHarness {
    pub bus: Arc<MessageBus>,
    pub engine: Arc<WorkflowEngine>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
}

/// The standard workflow roster backed by the given model.
pub fn workflow_agents(
    model: &Arc<ScriptedModel>,
    request_approval: bool,
) -> Vec<Arc<SwarmAgent>> {
    let limits = fast_limits();
    let llm: Arc<dyn LanguageModel> = Arc::clone(model) as Arc<dyn LanguageModel>;
    vec![
        SwarmAgent::new(
            AgentRole::RepositoryAnalyst,
            "Analyst",
            Arc::new(AnalystExecutor::new(StubRepo::sample())),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::CuttingEdgePlanner,
            "Cutting-Edge Planner",
            Arc::new(PlannerExecutor::new(PlannerKind::CuttingEdge)),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::ConservativePlanner,
            "Conservative Planner",
            Arc::new(PlannerExecutor::new(PlannerKind::Conservative)),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::SynthesisPlanner,
            "Synthesis Planner",
            Arc::new(PlannerExecutor::new(PlannerKind::Synthesis)),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::CodeGenerator,
            "Generator",
            Arc::new(GeneratorExecutor::new(GeneratorMode::Generate, Arc::clone(&llm))),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::Debugger,
            "Debugger",
            Arc::new(GeneratorExecutor::new(GeneratorMode::Debug, Arc::clone(&llm))),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::Optimizer,
            "Optimizer",
            Arc::new(GeneratorExecutor::new(GeneratorMode::Optimize, Arc::clone(&llm))),
            limits.clone(),
            100,
        ),
        SwarmAgent::new(
            AgentRole::QualityAssessor,
            "Assessor",
            Arc::new(
                GeneratorExecutor::new(GeneratorMode::Assess, llm)
                    .with_approval_requests(request_approval),
            ),
            limits,
            100,
        ),
    ]
}

/// Build a bus + engine over the given roster.
pub fn engine_harness(
    agents: Vec<Arc<SwarmAgent>>,
    settings: WorkflowSettings,
    gate: Arc<dyn ApprovalGate>,
) -> EngineHarness {
    let bus = MessageBus::new(fast_bus());
    for agent in agents {
        agent.start();
        bus.register_agent(agent);
    }
    bus.start();
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&bus),
        Arc::clone(&checkpoints) as Arc<dyn quorum::domain::ports::checkpoint::CheckpointStore>,
        gate,
        settings,
    ));
    EngineHarness {
        bus,
        engine,
        checkpoints,
    }
}

/// Replace the agent with the given role by one backed by `executor`.
pub fn replace_role(
    agents: &mut Vec<Arc<SwarmAgent>>,
    role: AgentRole,
    executor: Arc<dyn TaskExecutor>,
) {
    agents.retain(|agent| agent.role() != role);
    agents.push(SwarmAgent::new(role, "Replacement", executor, fast_limits(), 100));
}
