//! Benchmarks for the hot paths that run on every prompt.
//!
//! Run with: `cargo bench -p mnemos-memory --bench trigger_benchmarks`

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mnemos_memory::fusion::reciprocal_rank_fusion;
use mnemos_memory::{TriggerMatcher, DEFAULT_RRF_K};
use std::collections::BTreeSet;

fn build_matcher(entries: u64) -> TriggerMatcher {
    let mut matcher = TriggerMatcher::new();
    for id in 0..entries {
        let phrases: BTreeSet<String> = [
            format!("topic {id}"),
            format!("service-{} outage", id % 97),
            "release checklist".to_string(),
        ]
        .into_iter()
        .collect();
        matcher.index(id, &phrases);
    }
    matcher
}

fn bench_trigger_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("trigger_match");
    let text = "Paging on service-42 outage again, see topic 1234 and the release checklist. "
        .repeat(8);
    let now = Utc::now();

    for size in [100u64, 1_000, 5_000] {
        let matcher = build_matcher(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &matcher, |b, m| {
            b.iter(|| m.match_text(black_box(&text), 10, |_| Some(now)));
        });
    }
    group.finish();
}

fn bench_rrf(c: &mut Criterion) {
    let keyword: Vec<u64> = (0..300).collect();
    let vector: Vec<u64> = (150..450).rev().collect();
    c.bench_function("rrf_two_lists_300", |b| {
        b.iter(|| {
            reciprocal_rank_fusion(
                black_box(&[keyword.as_slice(), vector.as_slice()]),
                DEFAULT_RRF_K,
                30,
            )
        });
    });
}

criterion_group!(benches, bench_trigger_match, bench_rrf);
criterion_main!(benches);
