use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mes_calc::{AllocationEngine, BatchSizePlanner, SplitStrategy};
use mes_core::{BatchSizeConfig, InventoryLot, MaterialRequirement};
use rust_decimal::Decimal;

fn fixture(materials: usize, lots_per_material: usize) -> (Vec<MaterialRequirement>, Vec<InventoryLot>) {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    let requirements = (0..materials)
        .map(|m| {
            MaterialRequirement::new(format!("MAT-{m:04}"), Decimal::new(25, 1), "kg".to_string())
                .with_yield_loss_ratio(Decimal::new(105, 2))
        })
        .collect();

    let lots = (0..materials)
        .flat_map(|m| {
            (0..lots_per_material).map(move |l| {
                InventoryLot::new(
                    format!("LOT-{m:04}-{l:03}"),
                    format!("MAT-{m:04}"),
                    Decimal::from(40 + (l % 7) as i64),
                    "kg".to_string(),
                    base + Duration::hours(l as i64),
                )
            })
        })
        .collect();

    (requirements, lots)
}

fn bench_allocation(c: &mut Criterion) {
    let engine = AllocationEngine::new(3);
    let mut group = c.benchmark_group("allocation_propose");

    for materials in [10usize, 100, 500] {
        let (requirements, lots) = fixture(materials, 20);
        group.bench_with_input(BenchmarkId::from_parameter(materials), &materials, |b, _| {
            b.iter(|| engine.propose(black_box(&requirements), Decimal::from(100), black_box(&lots)))
        });
    }

    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let planner = BatchSizePlanner::new(Vec::new(), 3);
    let config = BatchSizeConfig::new(
        "MIXING".to_string(),
        "PASTE-01".to_string(),
        Decimal::ZERO,
        Decimal::from(400),
        "kg".to_string(),
    )
    .with_preferred_batch_size(Decimal::from(400));

    c.bench_function("plan_split_even", |b| {
        b.iter(|| planner.plan_split(black_box(Decimal::new(1_234_567, 1)), &config))
    });
    c.bench_function("plan_split_preferred_fill", |b| {
        b.iter(|| {
            planner.plan_split_with(
                black_box(Decimal::new(1_234_567, 1)),
                &config,
                SplitStrategy::PreferredFill,
            )
        })
    });
}

criterion_group!(benches, bench_allocation, bench_split);
criterion_main!(benches);
