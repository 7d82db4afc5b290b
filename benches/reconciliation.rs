//! Benchmarks for the result-reconciliation strategies.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quorum::domain::models::task::ContextMap;
use quorum::services::reconciliation::{resolve, ResolutionStrategy, ResultCandidate};
use serde_json::json;

fn candidates(count: usize, keys: usize, disagreement: usize) -> Vec<ResultCandidate> {
    (0..count)
        .map(|agent| {
            let mut payload = ContextMap::new();
            for key in 0..keys {
                // The last `disagreement` keys differ per agent
                let value = if key >= keys.saturating_sub(disagreement) {
                    json!(format!("agent-{agent}-{key}"))
                } else {
                    json!(format!("shared-{key}"))
                };
                payload.insert(format!("k{key}"), value);
            }
            ResultCandidate::new(format!("agent-{agent}"), payload).with_priority(agent as u32)
        })
        .collect()
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");
    for &count in &[2usize, 5, 10] {
        let input = candidates(count, 20, 4);
        for strategy in [
            ResolutionStrategy::Consensus,
            ResolutionStrategy::Majority,
            ResolutionStrategy::ExpertPriority,
        ] {
            group.bench_with_input(
                BenchmarkId::new(strategy.as_str(), count),
                &input,
                |b, input| b.iter(|| resolve(black_box(input), strategy)),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);
