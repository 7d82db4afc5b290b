//! Implementation plan model shared by the planner family.
//!
//! Plans carry a technology stack and an ordered step list with derived
//! scores. Scoring formulas are fixed so that plans from different
//! planner variants are directly comparable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk levels for planning approaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }
}

/// Implementation complexity of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepComplexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Default for StepComplexity {
    fn default() -> Self {
        Self::Moderate
    }
}

impl StepComplexity {
    /// Weight used by the complexity score (1..=5).
    pub fn weight(&self) -> u32 {
        match self {
            Self::Trivial => 1,
            Self::Simple => 2,
            Self::Moderate => 3,
            Self::Complex => 4,
            Self::VeryComplex => 5,
        }
    }
}

/// Maturity classification of a technology choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechMaturity {
    Experimental,
    Alpha,
    Beta,
    Stable,
    Mature,
    Legacy,
}

impl TechMaturity {
    /// Risk contribution used by the overall risk assessment.
    /// Mature and legacy technologies carry no maturity risk.
    pub fn risk_points(&self) -> u32 {
        match self {
            Self::Experimental => 5,
            Self::Alpha => 4,
            Self::Beta => 3,
            Self::Stable => 1,
            Self::Mature | Self::Legacy => 0,
        }
    }
}

/// A technology choice in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyChoice {
    pub name: String,
    pub category: String,
    pub version: Option<String>,
    pub maturity: TechMaturity,
    pub justification: String,
    pub alternatives: Vec<String>,
    pub risk_factors: Vec<String>,
    pub benefits: Vec<String>,
}

impl TechnologyChoice {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        maturity: TechMaturity,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            version: None,
            maturity,
            justification: justification.into(),
            alternatives: Vec::new(),
            risk_factors: Vec::new(),
            benefits: Vec::new(),
        }
    }
}

/// An individual step in an implementation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_hours: f64,
    pub complexity: StepComplexity,
    pub dependencies: Vec<String>,
    pub risks: Vec<String>,
    pub deliverables: Vec<String>,
    pub validation_criteria: Vec<String>,
    pub technologies: Vec<String>,
}

impl PlanStep {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        estimated_hours: f64,
        complexity: StepComplexity,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            estimated_hours,
            complexity,
            dependencies: Vec::new(),
            risks: Vec::new(),
            deliverables: Vec::new(),
            validation_criteria: Vec::new(),
            technologies: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_risk(mut self, risk: impl Into<String>) -> Self {
        self.risks.push(risk.into());
        self
    }

    pub fn with_deliverable(mut self, deliverable: impl Into<String>) -> Self {
        self.deliverables.push(deliverable.into());
        self
    }

    pub fn with_validation(mut self, criterion: impl Into<String>) -> Self {
        self.validation_criteria.push(criterion.into());
        self
    }

    pub fn with_technology(mut self, tech: impl Into<String>) -> Self {
        self.technologies.push(tech.into());
        self
    }
}

/// A complete implementation plan produced by one planner variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub planner: String,
    pub title: String,
    pub summary: String,
    pub approach: String,
    pub technology_stack: Vec<TechnologyChoice>,
    pub steps: Vec<PlanStep>,
    pub overall_risk: RiskLevel,
    pub estimated_total_hours: f64,
    pub complexity_score: f64,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Whether repository context informed the plan
    pub repository_context_used: bool,
    /// How many similar prior implementations were retrieved
    pub similar_implementations_found: usize,
}

impl Plan {
    /// Assemble a plan and compute its derived scores.
    pub fn assemble(
        plan_id: impl Into<String>,
        planner: impl Into<String>,
        title: impl Into<String>,
        technology_stack: Vec<TechnologyChoice>,
        steps: Vec<PlanStep>,
    ) -> Self {
        let estimated_total_hours = estimate_effort(&steps);
        let complexity_score = complexity_score(&steps);
        let overall_risk = assess_overall_risk(&technology_stack, &steps);
        Self {
            plan_id: plan_id.into(),
            planner: planner.into(),
            title: title.into(),
            summary: String::new(),
            approach: String::new(),
            technology_stack,
            steps,
            overall_risk,
            estimated_total_hours,
            complexity_score,
            pros: Vec::new(),
            cons: Vec::new(),
            created_at: Utc::now(),
            repository_context_used: false,
            similar_implementations_found: 0,
        }
    }
}

/// Total effort: sum of per-step hour estimates.
pub fn estimate_effort(steps: &[PlanStep]) -> f64 {
    steps.iter().map(|s| s.estimated_hours).sum()
}

/// Normalized complexity score in 0..=1.
///
/// Sum of complexity weights divided by the maximum possible (5 per step).
pub fn complexity_score(steps: &[PlanStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    let total: u32 = steps.iter().map(|s| s.complexity.weight()).sum();
    f64::from(total) / (steps.len() as f64 * 5.0)
}

/// Overall risk from technology maturity and step complexity.
///
/// Averages the mean maturity risk of the stack with the complexity score
/// scaled to 0..=5, then maps: <=1 very-low, <=2 low, <=3 medium,
/// <=4 high, else very-high. With no inputs the assessment is medium.
pub fn assess_overall_risk(technologies: &[TechnologyChoice], steps: &[PlanStep]) -> RiskLevel {
    let mut risk_scores: Vec<f64> = Vec::new();

    if !technologies.is_empty() {
        let tech_risk: u32 = technologies.iter().map(|t| t.maturity.risk_points()).sum();
        risk_scores.push(f64::from(tech_risk) / technologies.len() as f64);
    }

    risk_scores.push(complexity_score(steps) * 5.0);

    if risk_scores.is_empty() {
        return RiskLevel::Medium;
    }
    let avg = risk_scores.iter().sum::<f64>() / risk_scores.len() as f64;
    if avg <= 1.0 {
        RiskLevel::VeryLow
    } else if avg <= 2.0 {
        RiskLevel::Low
    } else if avg <= 3.0 {
        RiskLevel::Medium
    } else if avg <= 4.0 {
        RiskLevel::High
    } else {
        RiskLevel::VeryHigh
    }
}
