//! Benchmarks for line matching.
//!
//! Tests: packet size scaling, rule count scaling, match density.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use line_repeater::repeater::{match_lines, RuleSet};

fn packet(lines: usize) -> Vec<u8> {
    (0..lines)
        .map(|i| match i % 3 {
            0 => format!("api.requests.{i}:1|c\n"),
            1 => format!("db.latency.{i}:{i}|ms\n"),
            _ => format!("cache.hits.{i}:{i}|g\n"),
        })
        .collect::<String>()
        .into_bytes()
}

// ---------------------------------------------------------------------------
// Packet size
// ---------------------------------------------------------------------------

fn bench_packet_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/packet_size");
    let rules = RuleSet::compile(&["^api\\.", "^db\\."]).unwrap();

    for lines in [1usize, 16, 128, 1024] {
        let data = packet(lines);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(lines), &data, |b, data| {
            b.iter(|| {
                let mut sent = 0usize;
                match_lines(black_box(data), &rules, |line| sent += line.len());
                black_box(sent)
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Rule count
// ---------------------------------------------------------------------------

fn bench_rule_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/rule_count");
    let data = packet(128);

    for count in [1usize, 4, 16, 64] {
        let patterns: Vec<String> = (0..count).map(|i| format!("^svc{i}\\.")).collect();
        let rules = RuleSet::compile(&patterns).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), &rules, |b, rules| {
            b.iter(|| black_box(match_lines(black_box(&data), rules, |_| {})));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Match density
// ---------------------------------------------------------------------------

fn bench_match_density(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/density");
    let data = packet(128);

    for (name, pattern) in [("none", "^nothing"), ("third", "^api\\."), ("all", ".")] {
        let rules = RuleSet::compile(&[pattern]).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| black_box(match_lines(black_box(&data), &rules, |_| {})));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_size,
    bench_rule_count,
    bench_match_density,
);
criterion_main!(benches);
