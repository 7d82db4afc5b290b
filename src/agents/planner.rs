//! Planner executors.
//!
//! The three planner variants share one executor type and differ only in
//! their `PlannerKind` value: technology catalog, risk tolerance, and
//! step shaping. The synthesis variant additionally consumes the other
//! two plans from the task context and merges them.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::errors::DomainResult;
use crate::domain::models::memory::AgentMemory;
use crate::domain::models::plan::{
    Plan, PlanStep, RiskLevel, StepComplexity, TechMaturity, TechnologyChoice,
};
use crate::domain::models::task::{ContextMap, Task, TaskType};
use crate::domain::ports::retrieval::{RetrievalEngine, RetrievalQuery};

use super::TaskExecutor;

/// Risk posture of a planner variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerKind {
    CuttingEdge,
    Conservative,
    Synthesis,
}

impl PlannerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CuttingEdge => "cutting_edge",
            Self::Conservative => "conservative",
            Self::Synthesis => "synthesis",
        }
    }

    pub fn risk_tolerance(&self) -> RiskLevel {
        match self {
            Self::CuttingEdge => RiskLevel::High,
            Self::Conservative => RiskLevel::Low,
            Self::Synthesis => RiskLevel::Medium,
        }
    }

    /// Technology catalog biased by the variant's risk tolerance.
    fn technology_catalog(&self) -> Vec<TechnologyChoice> {
        match self {
            Self::CuttingEdge => vec![
                TechnologyChoice::new(
                    "edge-runtime",
                    "runtime",
                    TechMaturity::Beta,
                    "latest execution model with streaming primitives",
                ),
                TechnologyChoice::new(
                    "vector-store",
                    "storage",
                    TechMaturity::Alpha,
                    "native similarity search without an external index",
                ),
                TechnologyChoice::new(
                    "reactive-ui",
                    "ui",
                    TechMaturity::Beta,
                    "fine-grained reactivity for live updates",
                ),
                TechnologyChoice::new(
                    "grpc-streaming",
                    "api",
                    TechMaturity::Stable,
                    "bidirectional streaming between services",
                ),
            ],
            // The synthesis fallback plans from the balanced catalog,
            // which is the conservative catalog with a beta API layer.
            Self::Conservative | Self::Synthesis => vec![
                TechnologyChoice::new(
                    "managed-runtime",
                    "runtime",
                    TechMaturity::Mature,
                    "battle-tested scheduler with predictable behavior",
                ),
                TechnologyChoice::new(
                    "relational-store",
                    "storage",
                    TechMaturity::Mature,
                    "transactional guarantees and mature tooling",
                ),
                TechnologyChoice::new(
                    "server-rendered-ui",
                    "ui",
                    TechMaturity::Stable,
                    "simple rendering path with broad support",
                ),
                TechnologyChoice::new(
                    "rest-api",
                    "api",
                    if matches!(self, Self::Synthesis) {
                        TechMaturity::Beta
                    } else {
                        TechMaturity::Stable
                    },
                    "uniform interface, cacheable, well understood",
                ),
            ],
        }
    }

    /// Step templates. Shared titles across variants are intentional so
    /// synthesis merges them rather than concatenating two plans.
    fn step_templates(&self) -> Vec<PlanStep> {
        let (design_hours, implement_hours, validate_hours) = match self {
            Self::CuttingEdge => (4.0, 16.0, 8.0),
            Self::Conservative => (8.0, 12.0, 10.0),
            Self::Synthesis => (6.0, 14.0, 9.0),
        };
        let implement_complexity = match self {
            Self::CuttingEdge => StepComplexity::Complex,
            Self::Conservative => StepComplexity::Moderate,
            Self::Synthesis => StepComplexity::Moderate,
        };
        vec![
            PlanStep::new(
                format!("{}_design", self.as_str()),
                "Design and interface contract",
                design_hours,
                StepComplexity::Moderate,
            )
            .with_description("Define module boundaries, data contracts, and failure modes")
            .with_deliverable("interface definitions")
            .with_validation("design review sign-off"),
            PlanStep::new(
                format!("{}_implement", self.as_str()),
                "Core implementation",
                implement_hours,
                implement_complexity,
            )
            .with_description("Implement the core behavior behind the agreed interfaces")
            .with_risk(match self {
                Self::CuttingEdge => "immature dependencies may change under us",
                Self::Conservative => "established stack may need more glue code",
                Self::Synthesis => "mixed stack increases integration surface",
            })
            .with_deliverable("working implementation"),
            PlanStep::new(
                format!("{}_validate", self.as_str()),
                "Integration validation",
                validate_hours,
                StepComplexity::Moderate,
            )
            .with_description("Exercise the implementation end to end against the contract")
            .with_validation("integration suite green")
            .with_deliverable("validation report"),
        ]
    }
}

/// Executor for all planner variants.
pub struct PlannerExecutor {
    kind: PlannerKind,
    retrieval: Option<Arc<dyn RetrievalEngine>>,
}

impl PlannerExecutor {
    pub fn new(kind: PlannerKind) -> Self {
        Self {
            kind,
            retrieval: None,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalEngine>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// Query the retrieval collaborator for similar prior work.
    /// Failures degrade to planning without repository context.
    async fn similar_implementations(&self, task: &Task) -> (bool, usize) {
        let Some(retrieval) = &self.retrieval else {
            return (false, 0);
        };
        match retrieval
            .retrieve(RetrievalQuery::new(task.description.clone()))
            .await
        {
            Ok(result) => (true, result.chunks.len()),
            Err(err) => {
                tracing::warn!(error = %err, "Retrieval unavailable, planning without context");
                (false, 0)
            }
        }
    }

    fn plan_result(plan: &Plan, context_used: bool, plans_used: Option<usize>) -> ContextMap {
        let mut result = ContextMap::new();
        result.insert(
            "plan".into(),
            serde_json::to_value(plan).unwrap_or_else(|_| json!({})),
        );
        result.insert("planner".into(), json!(plan.planner));
        result.insert("context_used".into(), json!(context_used));
        result.insert("summary".into(), json!(plan.summary));
        if let Some(n) = plans_used {
            result.insert("plans_used".into(), json!(n));
        }
        result
    }

    fn build_plan(&self, task: &Task, context_used: bool, similar: usize) -> Plan {
        let mut plan = Plan::assemble(
            format!("{}_{}", self.kind.as_str(), task.id.simple()),
            self.kind.as_str(),
            task.title.clone(),
            self.kind.technology_catalog(),
            self.kind.step_templates(),
        );
        plan.summary = format!(
            "{} approach for: {}",
            self.kind.as_str().replace('_', " "),
            task.description
        );
        plan.approach = match self.kind {
            PlannerKind::CuttingEdge => {
                "Adopt the newest viable stack and optimize for capability".into()
            }
            PlannerKind::Conservative => {
                "Prefer proven components and optimize for predictability".into()
            }
            PlannerKind::Synthesis => {
                "Balance innovation and stability per component category".into()
            }
        };
        plan.repository_context_used = context_used;
        plan.similar_implementations_found = similar;
        plan
    }

    /// Synthesize a plan from the cutting-edge and conservative inputs.
    fn synthesize(&self, task: &Task, cutting_edge: &Plan, conservative: &Plan) -> Plan {
        let technology_stack =
            merge_technology_stacks(&cutting_edge.technology_stack, &conservative.technology_stack);
        let steps = merge_steps(&cutting_edge.steps, &conservative.steps);
        let mut plan = Plan::assemble(
            format!("synthesis_{}", task.id.simple()),
            PlannerKind::Synthesis.as_str(),
            task.title.clone(),
            technology_stack,
            steps,
        );
        plan.summary = format!("synthesized approach for: {}", task.description);
        plan.approach =
            "Conservative core for data paths, selective innovation at the edges".into();
        plan.repository_context_used =
            cutting_edge.repository_context_used || conservative.repository_context_used;
        plan
    }
}

/// Extract a `Plan` from a phase output map stored in the task context.
fn plan_from_context(context: &ContextMap, key: &str) -> Option<Plan> {
    let value = context.get(key)?;
    let plan_value = value.get("plan").unwrap_or(value);
    serde_json::from_value(plan_value.clone()).ok()
}

/// Merge two technology stacks by category.
///
/// Storage and data categories keep the conservative option; UI keeps the
/// cutting-edge option; everything else keeps conservative with an
/// annotated justification. Categories present in only one stack carry
/// over unchanged.
pub fn merge_technology_stacks(
    cutting_edge: &[TechnologyChoice],
    conservative: &[TechnologyChoice],
) -> Vec<TechnologyChoice> {
    let mut categories: Vec<String> = Vec::new();
    for tech in cutting_edge.iter().chain(conservative) {
        if !categories.contains(&tech.category) {
            categories.push(tech.category.clone());
        }
    }

    let mut merged = Vec::new();
    for category in categories {
        let edge = cutting_edge.iter().find(|t| t.category == category);
        let safe = conservative.iter().find(|t| t.category == category);
        match (edge, safe) {
            (Some(edge), Some(safe)) => {
                if category == "storage" || category == "data" {
                    merged.push(safe.clone());
                } else if category == "ui" || category == "frontend" {
                    merged.push(edge.clone());
                } else {
                    let mut choice = safe.clone();
                    choice.justification = format!(
                        "Balanced choice: {} with selective adoption of {} patterns",
                        safe.justification, edge.name
                    );
                    merged.push(choice);
                }
            }
            (Some(only), None) | (None, Some(only)) => merged.push(only.clone()),
            (None, None) => {}
        }
    }
    merged
}

/// Merge step lists by title.
///
/// Steps sharing a title merge into one: averaged effort, union of risks
/// and deliverables (capped at 5), conservative validation criteria, and
/// moderate complexity. Steps unique to one plan are adapted unchanged.
pub fn merge_steps(cutting_edge: &[PlanStep], conservative: &[PlanStep]) -> Vec<PlanStep> {
    let mut titles: Vec<String> = Vec::new();
    for step in cutting_edge.iter().chain(conservative) {
        if !titles.contains(&step.title) {
            titles.push(step.title.clone());
        }
    }

    let mut merged = Vec::new();
    for (index, title) in titles.iter().enumerate() {
        let edge = cutting_edge.iter().find(|s| &s.title == title);
        let safe = conservative.iter().find(|s| &s.title == title);
        let step = match (edge, safe) {
            (Some(edge), Some(safe)) => {
                let mut risks = edge.risks.clone();
                for risk in &safe.risks {
                    if !risks.contains(risk) {
                        risks.push(risk.clone());
                    }
                }
                risks.truncate(5);
                let mut deliverables = edge.deliverables.clone();
                for deliverable in &safe.deliverables {
                    if !deliverables.contains(deliverable) {
                        deliverables.push(deliverable.clone());
                    }
                }
                deliverables.truncate(5);

                let mut technologies = edge.technologies.clone();
                for tech in &safe.technologies {
                    if !technologies.contains(tech) {
                        technologies.push(tech.clone());
                    }
                }

                PlanStep {
                    id: format!("synthesis_step_{}", index + 1),
                    title: title.clone(),
                    description: format!("Balanced: {}", edge.description),
                    estimated_hours: (edge.estimated_hours + safe.estimated_hours) / 2.0,
                    complexity: StepComplexity::Moderate,
                    dependencies: edge.dependencies.clone(),
                    risks,
                    deliverables,
                    validation_criteria: safe.validation_criteria.clone(),
                    technologies,
                }
            }
            (Some(only), None) | (None, Some(only)) => {
                let mut step = only.clone();
                step.id = format!("synthesis_step_{}", index + 1);
                step
            }
            (None, None) => continue,
        };
        merged.push(step);
    }
    merged
}

#[async_trait]
impl TaskExecutor for PlannerExecutor {
    async fn execute(&self, task: &Task, memory: &mut AgentMemory) -> DomainResult<ContextMap> {
        let (context_used, similar) = self.similar_implementations(task).await;
        memory.store_working("similar_implementations", json!(similar));

        let is_synthesis_request = self.kind == PlannerKind::Synthesis
            && (task.task_type == TaskType::PlanSynthesis
                || task.context.contains_key("cutting_edge_plan")
                || task.context.contains_key("conservative_plan"));

        if is_synthesis_request {
            let cutting_edge = plan_from_context(&task.context, "cutting_edge_plan");
            let conservative = plan_from_context(&task.context, "conservative_plan");
            let plans_used =
                usize::from(cutting_edge.is_some()) + usize::from(conservative.is_some());

            let plan = match (cutting_edge, conservative) {
                (Some(edge), Some(safe)) => self.synthesize(task, &edge, &safe),
                // A missing input degrades to the balanced default rather
                // than failing the synthesis phase.
                _ => {
                    tracing::warn!(
                        task_id = %task.id,
                        plans_used,
                        "Synthesis input missing, falling back to balanced plan"
                    );
                    self.build_plan(task, context_used, similar)
                }
            };
            memory.store_knowledge(
                "plans",
                plan.plan_id.clone(),
                Value::String(plan.summary.clone()),
            );
            return Ok(Self::plan_result(&plan, context_used, Some(plans_used)));
        }

        let plan = self.build_plan(task, context_used, similar);
        memory.store_knowledge(
            "plans",
            plan.plan_id.clone(),
            Value::String(plan.summary.clone()),
        );
        Ok(Self::plan_result(&plan, context_used, None))
    }
}
