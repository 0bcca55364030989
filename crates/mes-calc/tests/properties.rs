//! 分配與拆批的性質測試

use chrono::{Duration, TimeZone, Utc};
use mes_calc::{AllocationEngine, BatchSizePlanner, ManualSelection, SplitStrategy};
use mes_core::{BatchSizeConfig, InventoryLot, MaterialRequirement};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;

const MATERIALS: [&str; 3] = ["RESIN", "PIGMENT", "SOLVENT"];

fn build_lots(specs: &[(usize, u32, i64)]) -> Vec<InventoryLot> {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    specs
        .iter()
        .enumerate()
        .map(|(i, (material, milli, day))| {
            InventoryLot::new(
                format!("LOT-{:03}", i),
                MATERIALS[*material].to_string(),
                Decimal::new(i64::from(*milli), 3),
                "kg".to_string(),
                base + Duration::days(*day),
            )
        })
        .collect()
}

fn build_requirements(specs: &[(usize, u32)]) -> Vec<MaterialRequirement> {
    specs
        .iter()
        .map(|(material, per_unit_milli)| {
            MaterialRequirement::new(
                MATERIALS[*material].to_string(),
                Decimal::new(i64::from(*per_unit_milli), 3),
                "kg".to_string(),
            )
        })
        .collect()
}

fn split_config(max_milli: u32) -> BatchSizeConfig {
    BatchSizeConfig::new(
        "MIXING".to_string(),
        "PASTE-01".to_string(),
        Decimal::ZERO,
        Decimal::new(i64::from(max_milli), 3),
        "kg".to_string(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    /// 每個批次的分配總量不超過其數量
    #[test]
    fn allocation_never_exceeds_lot_quantity(
        lot_specs in prop::collection::vec((0usize..3, 0u32..50_000, 0i64..30), 0..12),
        req_specs in prop::collection::vec((0usize..3, 1u32..5_000), 0..6),
        target in 1i64..200,
    ) {
        let lots = build_lots(&lot_specs);
        let requirements = build_requirements(&req_specs);
        let engine = AllocationEngine::new(3);

        let proposal = engine.propose(&requirements, Decimal::from(target), &lots);

        let mut per_lot: HashMap<&str, Decimal> = HashMap::new();
        for line in &proposal.lines {
            prop_assert!(line.quantity > Decimal::ZERO);
            *per_lot.entry(line.lot_id.as_str()).or_insert(Decimal::ZERO) += line.quantity;
        }
        for lot in &lots {
            let used = per_lot.get(lot.lot_id.as_str()).copied().unwrap_or(Decimal::ZERO);
            prop_assert!(used <= lot.quantity);
        }
        prop_assert_eq!(proposal.materials.len(), requirements.len());
    }

    /// 相同輸入產生相同建議
    #[test]
    fn proposal_is_idempotent(
        lot_specs in prop::collection::vec((0usize..3, 0u32..50_000, 0i64..5), 0..12),
        req_specs in prop::collection::vec((0usize..3, 1u32..5_000), 0..6),
        target in 1i64..200,
    ) {
        let lots = build_lots(&lot_specs);
        let requirements = build_requirements(&req_specs);
        let engine = AllocationEngine::new(3);

        let first = engine.propose(&requirements, Decimal::from(target), &lots);
        let second = engine.propose(&requirements, Decimal::from(target), &lots);
        prop_assert_eq!(first, second);
    }

    /// 手動選取的同物料總量不超過可用量
    #[test]
    fn manual_selection_is_bounded(
        lot_specs in prop::collection::vec((0usize..3, 0u32..50_000, 0i64..30), 1..8),
        picks in prop::collection::vec((0usize..8, 0u32..80_000), 0..16),
    ) {
        let lots = build_lots(&lot_specs);
        let selections: Vec<ManualSelection> = picks
            .iter()
            .map(|(idx, milli)| {
                ManualSelection::new(
                    format!("LOT-{:03}", idx % lots.len()),
                    Decimal::new(i64::from(*milli), 3),
                )
            })
            .collect();
        let engine = AllocationEngine::new(3);

        let proposal = engine.apply_manual(&[], Decimal::ONE, &selections, &lots);

        for material in MATERIALS {
            let available: Decimal = lots
                .iter()
                .filter(|l| l.material_id == material)
                .map(|l| l.quantity)
                .sum();
            prop_assert!(proposal.total_for(material) <= available);
        }
    }

    /// 拆批總和等於數量，且每批不超過上限
    #[test]
    fn split_preserves_total_and_respects_max(
        quantity_milli in 1u32..10_000_000,
        max_milli in 1_000u32..1_000_000,
        preferred in any::<bool>(),
    ) {
        let planner = BatchSizePlanner::new(Vec::new(), 3);
        let mut config = split_config(max_milli);
        if preferred {
            let max = config.max_batch_size;
            config = config.with_preferred_batch_size(max);
        }
        let quantity = Decimal::new(i64::from(quantity_milli), 3);
        let strategy = if preferred { SplitStrategy::PreferredFill } else { SplitStrategy::Even };

        match planner.plan_split_with(quantity, &config, strategy) {
            Some(plan) => {
                prop_assert!(quantity > config.max_batch_size);
                prop_assert!(plan.len() >= 2);
                prop_assert_eq!(plan.total(), quantity);
                prop_assert!(plan.max_batch() <= config.max_batch_size);
                prop_assert!(plan.min_batch() > Decimal::ZERO);
            }
            None => prop_assert!(quantity <= config.max_batch_size),
        }
    }

    /// 細解析度（12 位小數）下拆批仍保持總和與上限
    #[test]
    fn split_preserves_total_at_fine_resolution(
        quantity in 1u64..1_000_000_000,
        max in 100_000u64..100_000_000,
    ) {
        let planner = BatchSizePlanner::new(Vec::new(), 12);
        let config = BatchSizeConfig::new(
            "MIXING".to_string(),
            "PASTE-01".to_string(),
            Decimal::ZERO,
            Decimal::from(max),
            "kg".to_string(),
        );
        let quantity = Decimal::from(quantity);

        match planner.plan_split(quantity, &config) {
            Some(plan) => {
                prop_assert_eq!(plan.total(), quantity);
                prop_assert!(plan.max_batch() <= config.max_batch_size);
                prop_assert!(plan.min_batch() > Decimal::ZERO);
                prop_assert!(plan.max_batch() - plan.min_batch() <= Decimal::new(1, 12));
            }
            None => prop_assert!(quantity <= config.max_batch_size),
        }
    }

    /// 數量未超過上限時不拆批
    #[test]
    fn no_split_within_max(max_milli in 1u32..1_000_000, ratio in 0u32..=100) {
        let planner = BatchSizePlanner::new(Vec::new(), 3);
        let config = split_config(max_milli);
        let quantity = config.max_batch_size * Decimal::new(i64::from(ratio), 2);

        prop_assert!(planner.plan_split(quantity, &config).is_none());
    }
}
