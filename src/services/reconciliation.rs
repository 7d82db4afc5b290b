//! Result reconciliation.
//!
//! When multiple agents produce candidate results for the same task, the
//! bus reconciles them with a configurable strategy and reports a
//! confidence score for the chosen result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::models::task::ContextMap;

/// How conflicting candidate results are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep only keys on which every candidate agrees
    Consensus,
    /// Pick the most frequent canonicalized candidate
    Majority,
    /// Defer to the candidate with the highest declared priority
    ExpertPriority,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consensus => "consensus",
            Self::Majority => "majority",
            Self::ExpertPriority => "expert_priority",
        }
    }
}

/// One candidate result supplied by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultCandidate {
    pub agent_id: String,
    /// Caller-supplied priority for expert resolution; higher wins
    pub expert_priority: Option<u32>,
    pub payload: ContextMap,
}

impl ResultCandidate {
    pub fn new(agent_id: impl Into<String>, payload: ContextMap) -> Self {
        Self {
            agent_id: agent_id.into(),
            expert_priority: None,
            payload,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.expert_priority = Some(priority);
        self
    }
}

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub strategy: ResolutionStrategy,
    pub resolved: Option<ContextMap>,
    pub confidence: f64,
}

/// Reconcile candidate results under the given strategy.
pub fn resolve(candidates: &[ResultCandidate], strategy: ResolutionStrategy) -> Reconciliation {
    let resolved = match strategy {
        ResolutionStrategy::Consensus => resolve_by_consensus(candidates),
        ResolutionStrategy::Majority => resolve_by_majority(candidates),
        ResolutionStrategy::ExpertPriority => resolve_by_expert(candidates),
    };
    let confidence = confidence_score(resolved.as_ref(), candidates);
    tracing::debug!(
        strategy = strategy.as_str(),
        candidates = candidates.len(),
        confidence,
        "Reconciled candidate results"
    );
    Reconciliation {
        strategy,
        resolved,
        confidence,
    }
}

/// Keep each key shared by all candidates whose stringified values agree.
/// An empty consensus falls back to the first candidate unchanged.
fn resolve_by_consensus(candidates: &[ResultCandidate]) -> Option<ContextMap> {
    let first = candidates.first()?;
    let mut common_keys: Vec<&String> = first.payload.keys().collect();
    for candidate in &candidates[1..] {
        common_keys.retain(|key| candidate.payload.contains_key(*key));
    }

    let mut consensus = ContextMap::new();
    for key in common_keys {
        let reference = &first.payload[key];
        let unanimous = candidates
            .iter()
            .all(|c| stringify(&c.payload[key]) == stringify(reference));
        if unanimous {
            consensus.insert(key.clone(), reference.clone());
        }
    }

    if consensus.is_empty() {
        Some(first.payload.clone())
    } else {
        Some(consensus)
    }
}

/// Pick the candidate whose canonical (key-sorted) serialization appears
/// most often. Ties break by first occurrence.
fn resolve_by_majority(candidates: &[ResultCandidate]) -> Option<ContextMap> {
    if candidates.is_empty() {
        return None;
    }
    let canonical: Vec<String> = candidates.iter().map(|c| canonicalize(&c.payload)).collect();

    let mut best_index = 0;
    let mut best_count = 0;
    for (index, form) in canonical.iter().enumerate() {
        let count = canonical.iter().filter(|other| *other == form).count();
        if count > best_count {
            best_count = count;
            best_index = index;
        }
    }
    Some(candidates[best_index].payload.clone())
}

/// Defer to the candidate with the highest declared priority; first
/// occurrence wins ties and undeclared priorities count as zero.
fn resolve_by_expert(candidates: &[ResultCandidate]) -> Option<ContextMap> {
    if candidates.is_empty() {
        return None;
    }
    let mut best_index = 0;
    let mut best_priority = candidates[0].expert_priority.unwrap_or(0);
    for (index, candidate) in candidates.iter().enumerate().skip(1) {
        let priority = candidate.expert_priority.unwrap_or(0);
        if priority > best_priority {
            best_priority = priority;
            best_index = index;
        }
    }
    Some(candidates[best_index].payload.clone())
}

/// Average over candidates of (matching keys / common keys) against the
/// chosen result; 0 when undefined.
fn confidence_score(resolved: Option<&ContextMap>, candidates: &[ResultCandidate]) -> f64 {
    let Some(resolved) = resolved else {
        return 0.0;
    };
    if candidates.is_empty() {
        return 0.0;
    }

    let mut total = 0.0;
    for candidate in candidates {
        let common: Vec<&String> = resolved
            .keys()
            .filter(|key| candidate.payload.contains_key(*key))
            .collect();
        if common.is_empty() {
            continue;
        }
        let matching = common
            .iter()
            .filter(|key| {
                match (resolved.get(**key), candidate.payload.get(**key)) {
                    (Some(chosen), Some(candidate_value)) => {
                        stringify(chosen) == stringify(candidate_value)
                    }
                    _ => false,
                }
            })
            .count();
        total += matching as f64 / common.len() as f64;
    }
    (total / candidates.len() as f64).min(1.0)
}

/// Key-sorted serialization used for majority voting.
///
/// Nested objects serialize sorted as well, so two maps with the same
/// entries canonicalize identically regardless of insertion order.
fn canonicalize(payload: &ContextMap) -> String {
    let sorted: BTreeMap<&String, &Value> = payload.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn stringify(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(agent: &str, pairs: &[(&str, Value)]) -> ResultCandidate {
        let mut payload = ContextMap::new();
        for (key, value) in pairs {
            payload.insert((*key).to_string(), value.clone());
        }
        ResultCandidate::new(agent, payload)
    }

    #[test]
    fn test_consensus_identical_candidates() {
        let a = candidate("a", &[("x", json!(1)), ("y", json!("s"))]);
        let b = candidate("b", &[("x", json!(1)), ("y", json!("s"))]);
        let outcome = resolve(&[a.clone(), b], ResolutionStrategy::Consensus);
        assert_eq!(outcome.resolved, Some(a.payload));
        assert!((outcome.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_consensus_keeps_agreeing_keys_only() {
        let a = candidate("a", &[("x", json!(1)), ("y", json!("left"))]);
        let b = candidate("b", &[("x", json!(1)), ("y", json!("right"))]);
        let outcome = resolve(&[a, b], ResolutionStrategy::Consensus);
        let resolved = outcome.resolved.unwrap();
        assert_eq!(resolved.get("x"), Some(&json!(1)));
        assert!(!resolved.contains_key("y"));
    }

    #[test]
    fn test_consensus_disjoint_keys_returns_first() {
        let a = candidate("a", &[("x", json!(1))]);
        let b = candidate("b", &[("y", json!(2))]);
        let outcome = resolve(&[a.clone(), b], ResolutionStrategy::Consensus);
        assert_eq!(outcome.resolved, Some(a.payload));
    }

    #[test]
    fn test_majority_two_of_three() {
        let winner = candidate("a", &[("answer", json!(42))]);
        let same = candidate("b", &[("answer", json!(42))]);
        let outlier = candidate("c", &[("answer", json!(7))]);
        let outcome = resolve(&[outlier, winner.clone(), same], ResolutionStrategy::Majority);
        assert_eq!(outcome.resolved, Some(winner.payload));
    }

    #[test]
    fn test_majority_tie_breaks_by_first_occurrence() {
        let first = candidate("a", &[("answer", json!(1))]);
        let second = candidate("b", &[("answer", json!(2))]);
        let outcome = resolve(&[first.clone(), second], ResolutionStrategy::Majority);
        assert_eq!(outcome.resolved, Some(first.payload));
    }

    #[test]
    fn test_majority_canonicalization_ignores_key_order() {
        // Same entries, inserted in different orders
        let mut p1 = ContextMap::new();
        p1.insert("a".into(), json!(1));
        p1.insert("b".into(), json!(2));
        let mut p2 = ContextMap::new();
        p2.insert("b".into(), json!(2));
        p2.insert("a".into(), json!(1));
        let outlier = candidate("c", &[("z", json!(9))]);

        let outcome = resolve(
            &[
                outlier,
                ResultCandidate::new("a", p1.clone()),
                ResultCandidate::new("b", p2),
            ],
            ResolutionStrategy::Majority,
        );
        assert_eq!(outcome.resolved, Some(p1));
    }

    #[test]
    fn test_expert_priority_highest_wins() {
        let junior = candidate("junior", &[("v", json!("draft"))]).with_priority(1);
        let senior = candidate("senior", &[("v", json!("final"))]).with_priority(9);
        let outcome = resolve(&[junior, senior.clone()], ResolutionStrategy::ExpertPriority);
        assert_eq!(outcome.resolved, Some(senior.payload));
    }

    #[test]
    fn test_expert_priority_defaults_to_first_on_ties() {
        let a = candidate("a", &[("v", json!(1))]);
        let b = candidate("b", &[("v", json!(2))]);
        let outcome = resolve(&[a.clone(), b], ResolutionStrategy::ExpertPriority);
        assert_eq!(outcome.resolved, Some(a.payload));
    }

    #[test]
    fn test_empty_candidates_confidence_zero() {
        for strategy in [
            ResolutionStrategy::Consensus,
            ResolutionStrategy::Majority,
            ResolutionStrategy::ExpertPriority,
        ] {
            let outcome = resolve(&[], strategy);
            assert!(outcome.resolved.is_none());
            assert!(outcome.confidence.abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_confidence_partial_agreement() {
        let a = candidate("a", &[("x", json!(1)), ("y", json!(1))]);
        let b = candidate("b", &[("x", json!(1)), ("y", json!(2))]);
        let outcome = resolve(&[a, b], ResolutionStrategy::Consensus);
        // Resolved = {x: 1}; both candidates match fully on the common key
        assert!((outcome.confidence - 1.0).abs() < f64::EPSILON);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn payload_strategy() -> impl Strategy<Value = ContextMap> {
            proptest::collection::hash_map("[a-d]{1}", 0i64..5, 1..4).prop_map(|entries| {
                entries
                    .into_iter()
                    .map(|(k, v)| (k, json!(v)))
                    .collect::<ContextMap>()
            })
        }

        proptest! {
            /// Consensus over identical candidates is the identity.
            #[test]
            fn consensus_identity(payload in payload_strategy(), copies in 1usize..5) {
                let candidates: Vec<ResultCandidate> = (0..copies)
                    .map(|i| ResultCandidate::new(format!("agent-{i}"), payload.clone()))
                    .collect();
                let outcome = resolve(&candidates, ResolutionStrategy::Consensus);
                prop_assert_eq!(outcome.resolved, Some(payload));
                prop_assert!((outcome.confidence - 1.0).abs() < 1e-9);
            }

            /// Majority always returns one of the candidates.
            #[test]
            fn majority_closed_over_candidates(payloads in proptest::collection::vec(payload_strategy(), 1..6)) {
                let candidates: Vec<ResultCandidate> = payloads
                    .iter()
                    .enumerate()
                    .map(|(i, p)| ResultCandidate::new(format!("agent-{i}"), p.clone()))
                    .collect();
                let outcome = resolve(&candidates, ResolutionStrategy::Majority);
                let resolved = outcome.resolved.unwrap();
                prop_assert!(payloads.contains(&resolved));
            }

            /// Confidence is always within [0, 1].
            #[test]
            fn confidence_bounded(payloads in proptest::collection::vec(payload_strategy(), 0..6)) {
                let candidates: Vec<ResultCandidate> = payloads
                    .iter()
                    .enumerate()
                    .map(|(i, p)| ResultCandidate::new(format!("agent-{i}"), p.clone()))
                    .collect();
                for strategy in [
                    ResolutionStrategy::Consensus,
                    ResolutionStrategy::Majority,
                    ResolutionStrategy::ExpertPriority,
                ] {
                    let outcome = resolve(&candidates, strategy);
                    prop_assert!(outcome.confidence >= 0.0);
                    prop_assert!(outcome.confidence <= 1.0);
                }
            }
        }
    }
}
