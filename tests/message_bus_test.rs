//! Message bus integration tests: coordination round trips, group
//! messaging, reconciliation laws, and bounded history under load.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_bus, fast_limits};
use quorum::agents::planner::{PlannerExecutor, PlannerKind};
use quorum::agents::{AgentRole, SwarmAgent};
use quorum::domain::models::message::MessageKind;
use quorum::domain::models::task::{ContextMap, Task, TaskType};
use quorum::services::message_bus::{MessageBus, ResponseStatus};
use quorum::services::reconciliation::{resolve, ResolutionStrategy, ResultCandidate};
use serde_json::json;

fn planner(kind: PlannerKind, role: AgentRole) -> Arc<SwarmAgent> {
    let agent = SwarmAgent::new(
        role,
        "Planner",
        Arc::new(PlannerExecutor::new(kind)),
        fast_limits(),
        100,
    );
    agent.start();
    agent
}

fn planning_task() -> Task {
    Task::new("plan", "design a sync layer", TaskType::TaskPlanning)
}

/// Property: coordinate followed by an ample collect yields the assigned
/// agent's result.
#[tokio::test]
async fn test_coordinate_collect_round_trip() {
    let bus = MessageBus::new(fast_bus());
    bus.start();
    let agent = planner(PlannerKind::Conservative, AgentRole::ConservativePlanner);
    bus.register_agent(Arc::clone(&agent));

    let task = planning_task();
    let coordination = bus.coordinate(&task, None).unwrap();
    assert_eq!(coordination.assigned_agents, vec![agent.id().to_string()]);

    let responses = bus.collect(task.id, Duration::from_secs(30)).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, ResponseStatus::Completed);
    let result = responses[0].result.as_ref().unwrap();
    assert_eq!(result.get("planner"), Some(&json!("conservative")));

    let metrics = bus.metrics();
    assert_eq!(metrics.tasks_coordinated, 1);
    assert!(metrics.messages_delivered >= 1);
    bus.shutdown().await;
}

/// First-acceptable selection follows registration order.
#[tokio::test]
async fn test_first_acceptable_selection_order() {
    let bus = MessageBus::new(fast_bus());
    bus.start();
    let first = planner(PlannerKind::CuttingEdge, AgentRole::CuttingEdgePlanner);
    let second = planner(PlannerKind::Conservative, AgentRole::ConservativePlanner);
    bus.register_agent(Arc::clone(&first));
    bus.register_agent(Arc::clone(&second));

    let task = planning_task();
    let coordination = bus.coordinate(&task, None).unwrap();
    assert_eq!(coordination.assigned_agents, vec![first.id().to_string()]);
    assert_eq!(coordination.suitable_agents.len(), 2);
    bus.shutdown().await;
}

/// Group membership resolves at send time and excludes the sender.
#[tokio::test]
async fn test_group_round_trip() {
    let bus = MessageBus::new(fast_bus());
    bus.start();
    let a = planner(PlannerKind::CuttingEdge, AgentRole::CuttingEdgePlanner);
    let b = planner(PlannerKind::Conservative, AgentRole::ConservativePlanner);
    bus.register_agent(Arc::clone(&a));
    bus.register_agent(Arc::clone(&b));
    bus.create_group("planners", &[a.id().to_string(), b.id().to_string()])
        .unwrap();

    // Group creation notified both members
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bus.metrics().messages_delivered >= 2);

    let recipients = bus.send_to_group(
        "planners",
        a.id(),
        MessageKind::CollaborationRequest,
        ContextMap::new(),
    );
    assert_eq!(recipients, vec![b.id().to_string()]);

    // The collaboration handler replies and records the partner
    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = b.status().await;
    assert_eq!(status.collaboration_partners, vec![a.id().to_string()]);
    bus.shutdown().await;
}

/// Law 13: consensus over identical candidates is the identity; over
/// disjoint-keyed candidates it returns the first.
#[test]
fn test_consensus_laws() {
    let mut payload = ContextMap::new();
    payload.insert("answer".into(), json!({"steps": 3}));
    let identical: Vec<ResultCandidate> = (0..3)
        .map(|i| ResultCandidate::new(format!("agent-{i}"), payload.clone()))
        .collect();
    let outcome = resolve(&identical, ResolutionStrategy::Consensus);
    assert_eq!(outcome.resolved, Some(payload.clone()));

    let mut left = ContextMap::new();
    left.insert("left".into(), json!(1));
    let mut right = ContextMap::new();
    right.insert("right".into(), json!(2));
    let disjoint = vec![
        ResultCandidate::new("a", left.clone()),
        ResultCandidate::new("b", right),
    ];
    let outcome = resolve(&disjoint, ResolutionStrategy::Consensus);
    assert_eq!(outcome.resolved, Some(left));
}

/// Law 14: majority of three with two equal canonical forms picks the
/// pair; ties break by first occurrence.
#[test]
fn test_majority_laws() {
    let mut winner = ContextMap::new();
    winner.insert("v".into(), json!("agreed"));
    let mut outlier = ContextMap::new();
    outlier.insert("v".into(), json!("other"));

    let candidates = vec![
        ResultCandidate::new("a", outlier.clone()),
        ResultCandidate::new("b", winner.clone()),
        ResultCandidate::new("c", winner.clone()),
    ];
    let outcome = resolve(&candidates, ResolutionStrategy::Majority);
    assert_eq!(outcome.resolved, Some(winner));

    // All distinct: every form appears once, first occurrence wins
    let mut third = ContextMap::new();
    third.insert("v".into(), json!("third"));
    let tied = vec![
        ResultCandidate::new("a", outlier.clone()),
        ResultCandidate::new("b", third),
    ];
    let outcome = resolve(&tied, ResolutionStrategy::Majority);
    assert_eq!(outcome.resolved, Some(outlier));
}

/// History stays within its bound while traffic flows.
#[tokio::test]
async fn test_history_bound_under_load() {
    let mut settings = fast_bus();
    settings.history_bound = 25;
    let bus = MessageBus::new(settings);
    bus.start();
    let agent = planner(PlannerKind::Conservative, AgentRole::ConservativePlanner);
    bus.register_agent(Arc::clone(&agent));

    for _ in 0..100 {
        bus.send(quorum::domain::models::message::Message::direct(
            "peer",
            agent.id(),
            MessageKind::Custom("noise".into()),
            ContextMap::new(),
        ));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(bus.metrics().history_size <= 25);
    assert_eq!(bus.metrics().messages_delivered, 100);
    bus.shutdown().await;
}

/// Per-agent concurrency caps bound current task lists at all times.
#[tokio::test]
async fn test_concurrency_cap_respected() {
    let mut limits = fast_limits();
    limits.max_concurrent_tasks = 1;
    let agent = SwarmAgent::new(
        AgentRole::ConservativePlanner,
        "Capped",
        Arc::new(PlannerExecutor::new(PlannerKind::Conservative)),
        limits,
        100,
    );
    agent.start();

    let bus = MessageBus::new(fast_bus());
    bus.start();
    bus.register_agent(Arc::clone(&agent));

    // Saturate with assignments; the accept predicate sheds overflow
    let tasks: Vec<Task> = (0..5).map(|_| planning_task()).collect();
    for task in &tasks {
        let _ = bus.coordinate(task, None);
        assert!(agent.current_task_count() <= 1);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(agent.current_task_count() <= 1);
    bus.shutdown().await;
}
