//! Agent runtime.
//!
//! All workers share one concrete agent type. A `SwarmAgent` is a
//! capability bundle: a role tag, a capability set, resource limits, and
//! an injected executor value. Variants differ by their executor and
//! its parameters, not by subclassing.

pub mod analyst;
pub mod generator;
pub mod planner;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::memory::AgentMemory;
use crate::domain::models::message::{Message, MessageKind};
use crate::domain::models::task::{ContextMap, Task};

/// Role tags used for phase routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    RepositoryAnalyst,
    CuttingEdgePlanner,
    ConservativePlanner,
    SynthesisPlanner,
    CodeGenerator,
    Debugger,
    Optimizer,
    QualityAssessor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryAnalyst => "repository_analyst",
            Self::CuttingEdgePlanner => "cutting_edge_planner",
            Self::ConservativePlanner => "conservative_planner",
            Self::SynthesisPlanner => "synthesis_planner",
            Self::CodeGenerator => "code_generator",
            Self::Debugger => "debugger",
            Self::Optimizer => "optimizer",
            Self::QualityAssessor => "quality_assessor",
        }
    }

    /// Capabilities agents of this role advertise by default.
    pub fn default_capabilities(&self) -> Vec<String> {
        let types: &[&str] = match self {
            Self::RepositoryAnalyst => &["repository_analysis", "code_analysis"],
            Self::CuttingEdgePlanner | Self::ConservativePlanner => &["task_planning"],
            Self::SynthesisPlanner => &["task_planning", "plan_synthesis"],
            Self::CodeGenerator => &["code_generation", "feature_implementation", "bug_fix"],
            Self::Debugger => &["debugging"],
            Self::Optimizer => &["optimization"],
            Self::QualityAssessor => &["quality_assessment"],
        };
        types.iter().map(|t| format!("handle_{t}")).collect()
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-agent resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_concurrent_tasks: usize,
    pub memory_limit_mb: u64,
    pub task_timeout: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 3,
            memory_limit_mb: 512,
            task_timeout: Duration::from_secs(300),
        }
    }
}

/// Role-specific task logic, injected into the shared agent runtime.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Execute a task, producing a result map on success.
    ///
    /// Errors never escape the agent: the process pipeline maps them to
    /// a failed terminal task.
    async fn execute(&self, task: &Task, memory: &mut AgentMemory) -> DomainResult<ContextMap>;
}

/// Status snapshot returned by `status()` and status-inquiry replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusSnapshot {
    pub agent_id: String,
    pub name: String,
    pub role: AgentRole,
    pub is_active: bool,
    pub current_tasks: usize,
    pub capabilities: Vec<String>,
    pub collaboration_partners: Vec<String>,
    pub memory_usage: MemoryUsage,
}

/// Memory tier sizes for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub short_term_items: usize,
    pub working_items: usize,
    pub knowledge_categories: usize,
    pub conversation_messages: usize,
}

enum ExecOutcome {
    Success(ContextMap),
    Failure(String),
    TimedOut,
    Cancelled,
}

/// A cooperating worker backed by an executor value.
pub struct SwarmAgent {
    id: String,
    name: String,
    role: AgentRole,
    capabilities: HashSet<String>,
    limits: ResourceLimits,
    executor: Arc<dyn TaskExecutor>,
    active: AtomicBool,
    /// Memory is owned solely by this agent; holding the lock through
    /// execute() also serializes task execution per agent.
    memory: Mutex<AgentMemory>,
    current_tasks: StdMutex<Vec<Uuid>>,
    partners: StdMutex<Vec<String>>,
    /// Terminal task copies kept for bus collection, pruned by retention.
    finished: StdMutex<HashMap<Uuid, (Task, DateTime<Utc>)>>,
    task_tokens: StdMutex<HashMap<Uuid, CancellationToken>>,
    shutdown: StdMutex<CancellationToken>,
    /// Back-reference for spawning background processing from handlers.
    self_ref: Weak<SwarmAgent>,
}

impl SwarmAgent {
    /// Create an agent with role-derived id and capabilities.
    pub fn new(
        role: AgentRole,
        name: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
        limits: ResourceLimits,
        conversation_bound: usize,
    ) -> Arc<Self> {
        let suffix = Uuid::new_v4().simple().to_string();
        let id = format!("{}_{}", role.as_str(), &suffix[..8]);
        let name = name.into();
        Arc::new_cyclic(|self_ref| Self {
            id,
            name,
            role,
            capabilities: role.default_capabilities().into_iter().collect(),
            limits,
            executor,
            active: AtomicBool::new(false),
            memory: Mutex::new(AgentMemory::new(conversation_bound)),
            current_tasks: StdMutex::new(Vec::new()),
            partners: StdMutex::new(Vec::new()),
            finished: StdMutex::new(HashMap::new()),
            task_tokens: StdMutex::new(HashMap::new()),
            shutdown: StdMutex::new(CancellationToken::new()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self.capabilities.iter().cloned().collect();
        caps.sort();
        caps
    }

    pub fn current_task_count(&self) -> usize {
        self.current_tasks.lock().expect("current_tasks lock").len()
    }

    /// Start the agent: it begins accepting tasks.
    pub fn start(&self) {
        *self.shutdown.lock().expect("shutdown lock") = CancellationToken::new();
        self.active.store(true, Ordering::SeqCst);
        tracing::info!(agent_id = %self.id, role = %self.role, "Agent started");
    }

    /// Stop the agent: no new tasks are accepted, in-flight tasks are
    /// cancelled, and session memory is cleared.
    pub async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.shutdown.lock().expect("shutdown lock").cancel();
        let tokens: Vec<CancellationToken> = self
            .task_tokens
            .lock()
            .expect("task_tokens lock")
            .values()
            .cloned()
            .collect();
        for token in tokens {
            token.cancel();
        }
        self.memory.lock().await.clear_short_term();
        tracing::info!(agent_id = %self.id, role = %self.role, "Agent stopped");
    }

    /// The acceptance predicate:
    /// active, below the concurrency cap, and capable of the task type.
    pub fn accept(&self, task: &Task) -> bool {
        if !self.is_active() {
            tracing::debug!(agent_id = %self.id, task_id = %task.id, "Reject: agent inactive");
            return false;
        }
        if self.current_task_count() >= self.limits.max_concurrent_tasks {
            tracing::debug!(agent_id = %self.id, task_id = %task.id, "Reject: at capacity");
            return false;
        }
        if !self.capabilities.contains(&task.task_type.capability()) {
            tracing::debug!(
                agent_id = %self.id,
                task_id = %task.id,
                task_type = task.task_type.as_str(),
                "Reject: missing capability"
            );
            return false;
        }
        true
    }

    /// Process a task through the complete execution pipeline.
    ///
    /// Failure is local: exceptions from the executor never propagate;
    /// the returned task carries the outcome. Working memory is cleared
    /// on every exit path.
    pub async fn process(&self, mut task: Task) -> Task {
        let task_token = self.shutdown.lock().expect("shutdown lock").child_token();
        self.task_tokens
            .lock()
            .expect("task_tokens lock")
            .insert(task.id, task_token.clone());
        {
            // The assignment handler may have reserved the slot already.
            let mut current = self.current_tasks.lock().expect("current_tasks lock");
            if !current.contains(&task.id) {
                current.push(task.id);
            }
        }

        if let Err(err) = task.begin(self.id.clone()) {
            tracing::warn!(agent_id = %self.id, task_id = %task.id, error = %err, "Cannot begin task");
            self.forget_in_flight(task.id);
            return task;
        }
        tracing::info!(
            agent_id = %self.id,
            task_id = %task.id,
            task_type = task.task_type.as_str(),
            "Agent starting task"
        );

        let outcome = {
            let mut memory = self.memory.lock().await;
            memory.store_working("current_task_id", json!(task.id.to_string()));
            memory.store_working("task_started_at", json!(Utc::now().to_rfc3339()));

            let execution = self.executor.execute(&task, &mut memory);
            tokio::select! {
                () = task_token.cancelled() => ExecOutcome::Cancelled,
                result = tokio::time::timeout(self.limits.task_timeout, execution) => {
                    match result {
                        Err(_) => ExecOutcome::TimedOut,
                        Ok(Ok(output)) => ExecOutcome::Success(output),
                        Ok(Err(err)) => ExecOutcome::Failure(err.to_string()),
                    }
                }
            }
        };

        match outcome {
            ExecOutcome::Success(output) => {
                if let Err(err) = task.complete_with(output) {
                    tracing::warn!(agent_id = %self.id, task_id = %task.id, error = %err, "Completion rejected");
                }
                tracing::info!(agent_id = %self.id, task_id = %task.id, "Agent completed task");
            }
            ExecOutcome::Failure(error) => {
                tracing::error!(agent_id = %self.id, task_id = %task.id, error = %error, "Agent task failed");
                let _ = task.fail_with(error);
            }
            ExecOutcome::TimedOut => {
                let error = format!(
                    "timeout: task exceeded {} seconds",
                    self.limits.task_timeout.as_secs()
                );
                tracing::error!(agent_id = %self.id, task_id = %task.id, "Agent task timed out");
                let _ = task.fail_with(error);
            }
            ExecOutcome::Cancelled => {
                tracing::warn!(agent_id = %self.id, task_id = %task.id, "Agent task cancelled");
                task.cancel();
            }
        }

        self.memory.lock().await.clear_working();
        self.forget_in_flight(task.id);
        self.finished
            .lock()
            .expect("finished lock")
            .insert(task.id, (task.clone(), Utc::now()));
        task
    }

    fn forget_in_flight(&self, task_id: Uuid) {
        self.current_tasks
            .lock()
            .expect("current_tasks lock")
            .retain(|id| *id != task_id);
        self.task_tokens
            .lock()
            .expect("task_tokens lock")
            .remove(&task_id);
    }

    /// Cancel one in-flight task. Idempotent; unknown ids are ignored.
    pub fn cancel_task(&self, task_id: Uuid) {
        if let Some(token) = self
            .task_tokens
            .lock()
            .expect("task_tokens lock")
            .get(&task_id)
        {
            token.cancel();
        }
    }

    /// Terminal copy of a finished task, if still retained.
    pub fn finished_task(&self, task_id: Uuid) -> Option<Task> {
        self.finished
            .lock()
            .expect("finished lock")
            .get(&task_id)
            .map(|(task, _)| task.clone())
    }

    /// Drop terminal task copies older than the retention window.
    pub fn prune_finished(&self, retention: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::zero());
        self.finished
            .lock()
            .expect("finished lock")
            .retain(|_, (_, at)| *at >= cutoff);
    }

    /// Process an incoming message, optionally producing a reply.
    ///
    /// Built-in handlers: collaboration request, task assignment, status
    /// inquiry. Unknown types are logged and dropped.
    pub async fn receive(&self, message: Message) -> Option<Message> {
        self.memory.lock().await.record_message(message.clone());
        tracing::debug!(
            agent_id = %self.id,
            kind = %message.kind,
            sender = %message.sender_id,
            "Agent received message"
        );

        let reply = match &message.kind {
            MessageKind::CollaborationRequest => Some(self.handle_collaboration(&message)),
            MessageKind::TaskAssignment => self.handle_assignment(&message),
            MessageKind::StatusInquiry => Some(self.handle_status_inquiry(&message).await),
            other => {
                tracing::warn!(
                    agent_id = %self.id,
                    kind = %other,
                    "Agent received unknown message type"
                );
                None
            }
        };

        if let Some(reply) = reply.clone() {
            self.memory.lock().await.record_message(reply);
        }
        reply
    }

    fn handle_collaboration(&self, message: &Message) -> Message {
        let mut partners = self.partners.lock().expect("partners lock");
        if !partners.contains(&message.sender_id) {
            partners.push(message.sender_id.clone());
        }
        drop(partners);

        let mut content = ContextMap::new();
        content.insert("status".into(), json!("accepted"));
        content.insert("capabilities".into(), json!(self.capabilities()));
        Message::direct(
            self.id.clone(),
            message.sender_id.clone(),
            MessageKind::CollaborationAccepted,
            content,
        )
    }

    /// Materialize the carried task, apply the accept predicate, and if
    /// accepted, process it in the background.
    fn handle_assignment(&self, message: &Message) -> Option<Message> {
        let task_value = message.content.get("task")?;
        let task: Task = match serde_json::from_value(task_value.clone()) {
            Ok(task) => task,
            Err(err) => {
                tracing::warn!(agent_id = %self.id, error = %err, "Malformed task assignment");
                return None;
            }
        };
        let task_id = task.id;
        let accepted = self.accept(&task);
        if accepted {
            // Reserve the concurrency slot before handing off, so two
            // back-to-back assignments cannot both pass the accept check.
            self.current_tasks
                .lock()
                .expect("current_tasks lock")
                .push(task.id);
            if let Some(agent) = self.self_ref.upgrade() {
                tokio::spawn(async move {
                    agent.process(task).await;
                });
            }
        }

        let mut content = ContextMap::new();
        content.insert("task_id".into(), json!(task_id.to_string()));
        content.insert("accepted".into(), json!(accepted));
        Some(
            Message::direct(
                self.id.clone(),
                message.sender_id.clone(),
                MessageKind::TaskResponse,
                content,
            )
            .with_task(task_id),
        )
    }

    async fn handle_status_inquiry(&self, message: &Message) -> Message {
        let snapshot = self.status().await;
        let mut content = ContextMap::new();
        content.insert(
            "status".into(),
            serde_json::to_value(&snapshot).unwrap_or_else(|_| json!({})),
        );
        Message::direct(
            self.id.clone(),
            message.sender_id.clone(),
            MessageKind::StatusResponse,
            content,
        )
    }

    /// Current status snapshot.
    pub async fn status(&self) -> AgentStatusSnapshot {
        let memory = self.memory.lock().await;
        AgentStatusSnapshot {
            agent_id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            is_active: self.is_active(),
            current_tasks: self.current_task_count(),
            capabilities: self.capabilities(),
            collaboration_partners: self.partners.lock().expect("partners lock").clone(),
            memory_usage: MemoryUsage {
                short_term_items: memory.short_term_len(),
                working_items: memory.working_len(),
                knowledge_categories: memory.knowledge_categories(),
                conversation_messages: memory.conversation_len(),
            },
        }
    }

    /// Working-memory item count; exposed for invariant checks in tests.
    pub async fn working_memory_len(&self) -> usize {
        self.memory.lock().await.working_len()
    }
}

impl std::fmt::Debug for SwarmAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmAgent")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FailingExecutor, SleepyExecutor, StaticExecutor};
    use super::*;
    use crate::domain::models::task::{TaskStatus, TaskType};

    fn analyst_agent(executor: Arc<dyn TaskExecutor>) -> Arc<SwarmAgent> {
        let agent = SwarmAgent::new(
            AgentRole::RepositoryAnalyst,
            "Analyst",
            executor,
            ResourceLimits::default(),
            10,
        );
        agent.start();
        agent
    }

    fn analysis_task() -> Task {
        Task::new("analyze", "analyze repository", TaskType::RepositoryAnalysis)
    }

    #[test]
    fn test_role_capabilities() {
        assert!(AgentRole::RepositoryAnalyst
            .default_capabilities()
            .contains(&"handle_repository_analysis".to_string()));
        assert!(AgentRole::SynthesisPlanner
            .default_capabilities()
            .contains(&"handle_plan_synthesis".to_string()));
    }

    #[tokio::test]
    async fn test_accept_predicate() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        assert!(agent.accept(&analysis_task()));

        // Wrong capability
        let wrong = Task::new("gen", "generate", TaskType::CodeGeneration);
        assert!(!agent.accept(&wrong));

        // Inactive agent accepts nothing
        agent.stop().await;
        assert!(!agent.accept(&analysis_task()));
    }

    #[tokio::test]
    async fn test_process_success_pipeline() {
        let mut result = ContextMap::new();
        result.insert("answer".into(), json!(42));
        let agent = analyst_agent(Arc::new(StaticExecutor { result }));

        let done = agent.process(analysis_task()).await;
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.assigned_agent.as_deref(), Some(agent.id()));
        assert!(done.result.is_some());
        assert!(done.error.is_none());
        assert!(done.started_at.unwrap() <= done.completed_at.unwrap());

        // Cleanup: no in-flight tasks, working memory empty
        assert_eq!(agent.current_task_count(), 0);
        assert_eq!(agent.working_memory_len().await, 0);

        // Terminal copy retained for collection
        assert!(agent.finished_task(done.id).is_some());
    }

    #[tokio::test]
    async fn test_process_failure_is_local() {
        let agent = analyst_agent(Arc::new(FailingExecutor));
        let done = agent.process(analysis_task()).await;
        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("synthetic failure"));
        assert!(done.result.is_none());
        assert_eq!(agent.current_task_count(), 0);
        assert_eq!(agent.working_memory_len().await, 0);
    }

    #[tokio::test]
    async fn test_process_timeout() {
        let limits = ResourceLimits {
            task_timeout: Duration::from_millis(20),
            ..ResourceLimits::default()
        };
        let agent = SwarmAgent::new(
            AgentRole::RepositoryAnalyst,
            "Slow",
            Arc::new(SleepyExecutor {
                sleep: Duration::from_secs(5),
            }),
            limits,
            10,
        );
        agent.start();

        let done = agent.process(analysis_task()).await;
        assert_eq!(done.status, TaskStatus::Failed);
        assert!(done.error.as_deref().unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_task() {
        let agent = analyst_agent(Arc::new(SleepyExecutor {
            sleep: Duration::from_secs(30),
        }));
        let task = analysis_task();
        let task_id = task.id;

        let runner = Arc::clone(&agent);
        let handle = tokio::spawn(async move { runner.process(task).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        agent.stop().await;

        let done = handle.await.unwrap();
        assert_eq!(done.id, task_id);
        assert_eq!(done.status, TaskStatus::Cancelled);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_collaboration_request_reply() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        let request = Message::direct(
            "peer-1",
            agent.id(),
            MessageKind::CollaborationRequest,
            ContextMap::new(),
        );
        let reply = agent.receive(request).await.expect("reply");
        assert_eq!(reply.kind, MessageKind::CollaborationAccepted);
        assert_eq!(reply.recipient_id.as_deref(), Some("peer-1"));

        let snapshot = agent.status().await;
        assert_eq!(snapshot.collaboration_partners, vec!["peer-1".to_string()]);
    }

    #[tokio::test]
    async fn test_task_assignment_accept_and_run() {
        let mut result = ContextMap::new();
        result.insert("ok".into(), json!(true));
        let agent = analyst_agent(Arc::new(StaticExecutor { result }));

        let task = analysis_task();
        let task_id = task.id;
        let mut content = ContextMap::new();
        content.insert("task".into(), serde_json::to_value(&task).unwrap());
        let assignment = Message::from_system(agent.id(), MessageKind::TaskAssignment, content)
            .with_task(task_id);

        let reply = agent.receive(assignment).await.expect("reply");
        assert_eq!(reply.kind, MessageKind::TaskResponse);
        assert_eq!(reply.content.get("accepted"), Some(&json!(true)));

        // The spawned processing finishes shortly after
        for _ in 0..50 {
            if agent.finished_task(task_id).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let finished = agent.finished_task(task_id).expect("finished task");
        assert_eq!(finished.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_task_assignment_rejected_when_incapable() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        let task = Task::new("gen", "generate", TaskType::CodeGeneration);
        let mut content = ContextMap::new();
        content.insert("task".into(), serde_json::to_value(&task).unwrap());
        let assignment = Message::from_system(agent.id(), MessageKind::TaskAssignment, content);

        let reply = agent.receive(assignment).await.expect("reply");
        assert_eq!(reply.content.get("accepted"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_status_inquiry_reply() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        let inquiry = Message::direct(
            "peer-2",
            agent.id(),
            MessageKind::StatusInquiry,
            ContextMap::new(),
        );
        let reply = agent.receive(inquiry).await.expect("reply");
        assert_eq!(reply.kind, MessageKind::StatusResponse);
        let status = reply.content.get("status").unwrap();
        assert_eq!(status.get("is_active"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_unknown_message_kind_dropped() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        let message = Message::direct(
            "peer",
            agent.id(),
            MessageKind::Custom("mystery".into()),
            ContextMap::new(),
        );
        assert!(agent.receive(message).await.is_none());
    }

    #[tokio::test]
    async fn test_prune_finished() {
        let agent = analyst_agent(Arc::new(StaticExecutor {
            result: ContextMap::new(),
        }));
        let done = agent.process(analysis_task()).await;
        assert!(agent.finished_task(done.id).is_some());
        agent.prune_finished(Duration::from_secs(0));
        assert!(agent.finished_task(done.id).is_none());
    }
}
