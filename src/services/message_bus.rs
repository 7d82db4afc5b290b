//! Inter-agent message bus.
//!
//! Central routing service: registers agents, delivers queued messages in
//! FIFO order through a background worker, maintains collaboration
//! groups, coordinates per-task assignment, collects results with a
//! bounded poll, and reconciles conflicting results.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agents::{AgentRole, AgentStatusSnapshot, SwarmAgent};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::BusSettings;
use crate::domain::models::message::{Message, MessageKind};
use crate::domain::models::task::{ContextMap, Task};

use super::reconciliation::{self, Reconciliation, ResolutionStrategy, ResultCandidate};

/// Subscriber callback fired after successful delivery.
pub type Subscriber = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of task coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordination {
    pub task_id: Uuid,
    pub assigned_agents: Vec<String>,
    pub suitable_agents: Vec<String>,
}

/// Status of one collected response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

/// One agent's response gathered by `collect`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedResponse {
    pub agent_id: String,
    pub status: ResponseStatus,
    pub result: Option<ContextMap>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Counter snapshot plus live sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMetrics {
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_failed: u64,
    pub conflicts_resolved: u64,
    pub tasks_coordinated: u64,
    pub registered_agents: usize,
    pub queue_size: usize,
    pub history_size: usize,
    pub groups: usize,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    conflicts: AtomicU64,
    coordinated: AtomicU64,
}

/// Insertion-ordered agent registry so "first acceptable" selection is
/// deterministic.
#[derive(Default)]
struct Registry {
    agents: HashMap<String, Arc<SwarmAgent>>,
    order: Vec<String>,
}

/// Central message bus for inter-agent communication.
pub struct MessageBus {
    settings: BusSettings,
    registry: StdRwLock<Registry>,
    queue: StdMutex<VecDeque<Message>>,
    queue_notify: Notify,
    history: StdMutex<VecDeque<Message>>,
    groups: StdRwLock<HashMap<String, BTreeSet<String>>>,
    assignments: StdRwLock<HashMap<Uuid, Vec<String>>>,
    active_tasks: StdRwLock<HashMap<Uuid, Task>>,
    subscribers: StdRwLock<HashMap<String, Vec<Subscriber>>>,
    counters: Counters,
    shutdown: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    /// Back-reference used to hand the background workers an owner.
    self_ref: Weak<MessageBus>,
}

impl MessageBus {
    pub fn new(settings: BusSettings) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            settings,
            registry: StdRwLock::new(Registry::default()),
            queue: StdMutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            history: StdMutex::new(VecDeque::new()),
            groups: StdRwLock::new(HashMap::new()),
            assignments: StdRwLock::new(HashMap::new()),
            active_tasks: StdRwLock::new(HashMap::new()),
            subscribers: StdRwLock::new(HashMap::new()),
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            workers: StdMutex::new(Vec::new()),
            self_ref: self_ref.clone(),
        })
    }

    /// Spawn the delivery worker and the keep-alive tick. Idempotent
    /// enough for tests: calling twice spawns extra workers, so the
    /// manager calls it exactly once during init.
    pub fn start(&self) {
        let Some(bus) = self.self_ref.upgrade() else {
            return;
        };
        let worker = {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move { bus.delivery_loop().await })
        };
        let keepalive = tokio::spawn(async move { bus.keepalive_loop().await });
        let mut workers = self.workers.lock().expect("workers lock");
        workers.push(worker);
        workers.push(keepalive);
        tracing::info!("Message bus started");
    }

    /// Stop background work and cancel all active tasks. Idempotent.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> =
            self.workers.lock().expect("workers lock").drain(..).collect();
        for worker in workers {
            let _ = worker.await;
        }

        let task_ids: Vec<Uuid> = self
            .active_tasks
            .read()
            .expect("active_tasks lock")
            .keys()
            .copied()
            .collect();
        for task_id in task_ids {
            self.cancel_task(task_id);
        }
        tracing::info!("Message bus stopped");
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Register an agent with the bus.
    pub fn register_agent(&self, agent: Arc<SwarmAgent>) {
        let mut registry = self.registry.write().expect("registry lock");
        let id = agent.id().to_string();
        if registry.agents.insert(id.clone(), agent).is_none() {
            registry.order.push(id.clone());
        }
        tracing::info!(agent_id = %id, "Agent registered with message bus");
    }

    /// Unregister an agent.
    pub fn unregister_agent(&self, agent_id: &str) {
        let mut registry = self.registry.write().expect("registry lock");
        if registry.agents.remove(agent_id).is_some() {
            registry.order.retain(|id| id != agent_id);
            tracing::info!(agent_id = %agent_id, "Agent unregistered from message bus");
        }
    }

    pub fn agent(&self, agent_id: &str) -> Option<Arc<SwarmAgent>> {
        self.registry
            .read()
            .expect("registry lock")
            .agents
            .get(agent_id)
            .cloned()
    }

    /// First registered agent with the given role.
    pub fn find_agent_by_role(&self, role: AgentRole) -> Option<Arc<SwarmAgent>> {
        let registry = self.registry.read().expect("registry lock");
        registry
            .order
            .iter()
            .filter_map(|id| registry.agents.get(id))
            .find(|agent| agent.role() == role)
            .cloned()
    }

    /// All registered agents in registration order.
    pub fn agents(&self) -> Vec<Arc<SwarmAgent>> {
        let registry = self.registry.read().expect("registry lock");
        registry
            .order
            .iter()
            .filter_map(|id| registry.agents.get(id).cloned())
            .collect()
    }

    /// Status snapshot of every registered agent.
    pub async fn agent_statuses(&self) -> HashMap<String, AgentStatusSnapshot> {
        let agents = self.agents();
        let mut statuses = HashMap::with_capacity(agents.len());
        for agent in agents {
            statuses.insert(agent.id().to_string(), agent.status().await);
        }
        statuses
    }

    // ========================================================================
    // Messaging
    // ========================================================================

    /// Queue a message for delivery.
    pub fn send(&self, message: Message) {
        self.queue.lock().expect("queue lock").push_back(message);
        self.counters.sent.fetch_add(1, Ordering::Relaxed);
        self.queue_notify.notify_one();
    }

    /// Broadcast to every registered agent except the sender.
    /// Returns the recipient ids.
    pub fn broadcast(&self, sender_id: &str, kind: MessageKind, content: ContextMap) -> Vec<String> {
        let recipients: Vec<String> = {
            let registry = self.registry.read().expect("registry lock");
            registry
                .order
                .iter()
                .filter(|id| id.as_str() != sender_id)
                .cloned()
                .collect()
        };
        for recipient in &recipients {
            self.send(Message::direct(
                sender_id,
                recipient.clone(),
                kind.clone(),
                content.clone(),
            ));
        }
        tracing::info!(
            sender = %sender_id,
            recipients = recipients.len(),
            "Broadcast message queued"
        );
        recipients
    }

    /// Send to all members of a group except the sender. Membership is
    /// resolved at send time; unknown recipients are skipped silently.
    pub fn send_to_group(
        &self,
        group_name: &str,
        sender_id: &str,
        kind: MessageKind,
        content: ContextMap,
    ) -> Vec<String> {
        let members = match self.groups.read().expect("groups lock").get(group_name) {
            Some(members) => members.clone(),
            None => {
                tracing::warn!(group = %group_name, "Group not found");
                return Vec::new();
            }
        };

        let registry = self.registry.read().expect("registry lock");
        let mut recipients = Vec::new();
        for member in members {
            if member != sender_id && registry.agents.contains_key(&member) {
                self.send(Message::direct(
                    sender_id,
                    member.clone(),
                    kind.clone(),
                    content.clone(),
                ));
                recipients.push(member);
            }
        }
        recipients
    }

    /// Create a named collaboration group. Membership is immutable after
    /// creation; recreate the group to change it.
    pub fn create_group(&self, group_name: &str, agent_ids: &[String]) -> DomainResult<()> {
        let valid: BTreeSet<String> = {
            let registry = self.registry.read().expect("registry lock");
            agent_ids
                .iter()
                .filter(|id| registry.agents.contains_key(*id))
                .cloned()
                .collect()
        };
        if valid.len() < agent_ids.len() {
            tracing::warn!(group = %group_name, "Some agents not found when creating group");
        }
        if valid.len() < 2 {
            return Err(DomainError::ValidationFailed(format!(
                "Cannot create group {group_name} with fewer than 2 agents"
            )));
        }

        let members: Vec<String> = valid.iter().cloned().collect();
        self.groups
            .write()
            .expect("groups lock")
            .insert(group_name.to_string(), valid);

        let mut content = ContextMap::new();
        content.insert("group_name".into(), json!(group_name));
        content.insert("members".into(), json!(members));
        for member in &members {
            self.send(Message::from_system(
                member.clone(),
                MessageKind::GroupCreated,
                content.clone(),
            ));
        }
        tracing::info!(group = %group_name, members = members.len(), "Collaboration group created");
        Ok(())
    }

    /// Subscribe to deliveries of one message kind. Callbacks fire after
    /// successful delivery; their failures are isolated from the bus.
    pub fn subscribe(&self, kind: &str, callback: Subscriber) {
        self.subscribers
            .write()
            .expect("subscribers lock")
            .entry(kind.to_string())
            .or_default()
            .push(callback);
        tracing::debug!(kind = %kind, "Subscriber registered");
    }

    async fn delivery_loop(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().expect("queue lock").pop_front();
            if let Some(message) = next {
                self.deliver(message).await;
                continue;
            }
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.queue_notify.notified() => {}
            }
        }
        tracing::debug!("Delivery worker exited");
    }

    /// Deliver one message: append to history, hand to the recipient,
    /// queue any reply, notify subscribers. Failures increment a counter
    /// and are otherwise non-fatal.
    async fn deliver(&self, message: Message) {
        {
            let mut history = self.history.lock().expect("history lock");
            history.push_back(message.clone());
            while history.len() > self.settings.history_bound {
                history.pop_front();
            }
        }

        let Some(recipient_id) = message.recipient_id.clone() else {
            tracing::warn!(message_id = %message.id, "Message without recipient dropped");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let Some(recipient) = self.agent(&recipient_id) else {
            tracing::warn!(
                message_id = %message.id,
                recipient = %recipient_id,
                "Recipient not found for message"
            );
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let reply = recipient.receive(message.clone()).await;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        if let Some(reply) = reply {
            self.send(reply);
        }
        self.notify_subscribers(&message);
    }

    fn notify_subscribers(&self, message: &Message) {
        let callbacks: Vec<Subscriber> = self
            .subscribers
            .read()
            .expect("subscribers lock")
            .get(message.kind.as_str())
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            // Spawned so a panicking callback cannot take down delivery.
            let message = message.clone();
            tokio::spawn(async move { callback(message).await });
        }
    }

    /// Quiet tick loop; exits cleanly on shutdown.
    async fn keepalive_loop(self: Arc<Self>) {
        let period = Duration::from_secs(self.settings.keepalive_interval_seconds.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await; // immediate first tick
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                _ = interval.tick() => {
                    tracing::trace!("Bus keep-alive tick");
                    let tick = Message::broadcast(
                        Message::SYSTEM_SENDER,
                        MessageKind::KeepAlive,
                        ContextMap::new(),
                    );
                    self.notify_subscribers(&tick);
                }
            }
        }
        tracing::debug!("Keep-alive worker exited");
    }

    // ========================================================================
    // Task coordination
    // ========================================================================

    /// Coordinate task execution among agents.
    ///
    /// The candidate set is `preferred` intersected with the registry
    /// when non-empty, otherwise every registered agent. The first agent
    /// whose accept predicate passes is assigned and receives a
    /// task-assignment message carrying the task.
    pub fn coordinate(&self, task: &Task, preferred: Option<&[String]>) -> DomainResult<Coordination> {
        self.counters.coordinated.fetch_add(1, Ordering::Relaxed);
        self.active_tasks
            .write()
            .expect("active_tasks lock")
            .insert(task.id, task.clone());

        let candidates: Vec<Arc<SwarmAgent>> = {
            let registry = self.registry.read().expect("registry lock");
            match preferred {
                Some(ids) if !ids.is_empty() => ids
                    .iter()
                    .filter_map(|id| registry.agents.get(id).cloned())
                    .collect(),
                _ => registry
                    .order
                    .iter()
                    .filter_map(|id| registry.agents.get(id).cloned())
                    .collect(),
            }
        };

        let suitable: Vec<String> = candidates
            .iter()
            .filter(|agent| agent.accept(task))
            .map(|agent| agent.id().to_string())
            .collect();
        if suitable.is_empty() {
            tracing::warn!(task_id = %task.id, "No suitable agents found for task");
            return Err(DomainError::NoSuitableAgents(task.id));
        }

        // First acceptable agent; coordination returns the full suitable
        // set so callers can layer a smarter policy on top.
        let assigned = suitable[0].clone();
        let mut content = ContextMap::new();
        content.insert("task".into(), serde_json::to_value(task)?);
        content.insert("coordination_id".into(), json!(format!("coord_{}", task.id)));
        self.send(
            Message::from_system(assigned.clone(), MessageKind::TaskAssignment, content)
                .with_task(task.id),
        );

        self.assignments
            .write()
            .expect("assignments lock")
            .insert(task.id, vec![assigned.clone()]);
        tracing::info!(task_id = %task.id, agent_id = %assigned, "Task coordinated");

        Ok(Coordination {
            task_id: task.id,
            assigned_agents: vec![assigned],
            suitable_agents: suitable,
        })
    }

    /// Collect responses from the agents assigned to a task.
    ///
    /// Polls at the configured cadence until every assigned agent has a
    /// terminal copy of the task or the deadline passes. Agents that
    /// never respond are recorded with a timeout status; the call never
    /// blocks past the deadline.
    pub async fn collect(&self, task_id: Uuid, timeout: Duration) -> Vec<CollectedResponse> {
        let assigned: Vec<String> = self
            .assignments
            .read()
            .expect("assignments lock")
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        if assigned.is_empty() {
            tracing::warn!(task_id = %task_id, "No agents assigned to task");
            return Vec::new();
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let poll = Duration::from_millis(self.settings.poll_interval_ms.max(1));
        let mut responses: HashMap<String, CollectedResponse> = HashMap::new();

        loop {
            for agent_id in &assigned {
                if responses.contains_key(agent_id) {
                    continue;
                }
                let Some(agent) = self.agent(agent_id) else {
                    continue;
                };
                if let Some(task) = agent.finished_task(task_id) {
                    let status = match task.status {
                        crate::domain::models::task::TaskStatus::Completed => {
                            ResponseStatus::Completed
                        }
                        crate::domain::models::task::TaskStatus::Cancelled => {
                            ResponseStatus::Cancelled
                        }
                        _ => ResponseStatus::Failed,
                    };
                    responses.insert(
                        agent_id.clone(),
                        CollectedResponse {
                            agent_id: agent_id.clone(),
                            status,
                            result: task.result.clone(),
                            error: task.error.clone(),
                            completed_at: task.completed_at,
                        },
                    );
                }
            }

            if responses.len() >= assigned.len() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            let remaining = deadline - tokio::time::Instant::now();
            tokio::time::sleep(poll.min(remaining)).await;
        }

        for agent_id in &assigned {
            if !responses.contains_key(agent_id) {
                tracing::warn!(task_id = %task_id, agent_id = %agent_id, "Collection timed out");
                responses.insert(
                    agent_id.clone(),
                    CollectedResponse {
                        agent_id: agent_id.clone(),
                        status: ResponseStatus::Timeout,
                        result: None,
                        error: Some("agent did not respond within timeout".to_string()),
                        completed_at: None,
                    },
                );
            }
        }

        assigned
            .iter()
            .filter_map(|id| responses.remove(id))
            .collect()
    }

    /// Collect with the configured default timeout.
    pub async fn collect_default(&self, task_id: Uuid) -> Vec<CollectedResponse> {
        self.collect(
            task_id,
            Duration::from_secs(self.settings.collect_timeout_seconds),
        )
        .await
    }

    /// Reconcile conflicting candidate results for one task.
    pub fn resolve_conflicts(
        &self,
        candidates: &[ResultCandidate],
        strategy: ResolutionStrategy,
    ) -> Reconciliation {
        self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
        reconciliation::resolve(candidates, strategy)
    }

    /// Cancel one coordinated task: signal the assigned agents and mark
    /// the bus copy cancelled. Idempotent.
    pub fn cancel_task(&self, task_id: Uuid) {
        let assigned: Vec<String> = self
            .assignments
            .read()
            .expect("assignments lock")
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        for agent_id in assigned {
            if let Some(agent) = self.agent(&agent_id) {
                agent.cancel_task(task_id);
            }
        }
        if let Some(task) = self
            .active_tasks
            .write()
            .expect("active_tasks lock")
            .get_mut(&task_id)
        {
            task.cancel();
        }
    }

    /// Recent delivery history, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .expect("history lock")
            .iter()
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            messages_delivered: self.counters.delivered.load(Ordering::Relaxed),
            messages_failed: self.counters.failed.load(Ordering::Relaxed),
            conflicts_resolved: self.counters.conflicts.load(Ordering::Relaxed),
            tasks_coordinated: self.counters.coordinated.load(Ordering::Relaxed),
            registered_agents: self.registry.read().expect("registry lock").agents.len(),
            queue_size: self.queue.lock().expect("queue lock").len(),
            history_size: self.history.lock().expect("history lock").len(),
            groups: self.groups.read().expect("groups lock").len(),
        }
    }
}
