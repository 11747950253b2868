use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tokenburn_core::calculator::{hourly_burn_rate, refresh_active_metrics};
use tokenburn_core::{
    BlockConfig, ModelName, SessionBlockBuilder, TokenCounts, UsageEntry, UsageSnapshot,
    validate_snapshot,
};

fn create_test_entries(count: usize) -> Vec<UsageEntry> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut entries = Vec::with_capacity(count);
    let mut minute = 0i64;

    for i in 0..count {
        // a long pause every 200 entries forces gap blocks
        minute += if i % 200 == 199 { 420 } else { 2 };
        entries.push(
            UsageEntry::new(
                start + Duration::minutes(minute),
                ModelName::new(if i % 3 == 0 {
                    "claude-3-opus-20240229"
                } else {
                    "claude-3-5-sonnet-20241022"
                }),
                TokenCounts::new(
                    (i * 100) as u64,
                    (i * 50) as u64,
                    (i * 10) as u64,
                    (i * 5) as u64,
                ),
            )
            .with_cost(i as f64 * 0.01),
        );
    }

    entries
}

fn benchmark_block_building(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_building");

    for size in [100, 1_000, 10_000] {
        let entries = create_test_entries(size);
        let now = entries
            .last()
            .map(|e| e.timestamp + Duration::minutes(1))
            .unwrap_or_else(Utc::now);

        group.bench_with_input(BenchmarkId::new("build", size), &entries, |b, entries| {
            b.iter(|| {
                let blocks = SessionBlockBuilder::new(BlockConfig::default())
                    .build(black_box(entries), now);
                black_box(blocks);
            });
        });

        group.bench_with_input(BenchmarkId::new("build_and_refresh", size), &entries, |b, entries| {
            b.iter(|| {
                let mut blocks =
                    SessionBlockBuilder::new(BlockConfig::default()).build(entries, now);
                refresh_active_metrics(&mut blocks, now);
                black_box(hourly_burn_rate(&blocks, now));
            });
        });
    }

    group.finish();
}

fn benchmark_snapshot_validation(c: &mut Criterion) {
    let entries = create_test_entries(10_000);
    let now = entries[entries.len() - 1].timestamp;
    let blocks = SessionBlockBuilder::new(BlockConfig::default()).build(&entries, now);
    let raw = UsageSnapshot::from_blocks(&blocks).to_value().unwrap();

    c.bench_function("validate_snapshot", |b| {
        b.iter(|| black_box(validate_snapshot(black_box(&raw))));
    });
}

criterion_group!(benches, benchmark_block_building, benchmark_snapshot_validation);
criterion_main!(benches);
