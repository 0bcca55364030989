//! 耗用分配（先進先出）

use mes_core::quantity::round_qty;
use mes_core::{
    AllocationLine, EngineConfig, InventoryLot, MaterialAllocation, MaterialRequirement,
};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::{PlanWarning, WarningKind};

/// 分配建議結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationProposal {
    /// 分配行
    pub lines: Vec<AllocationLine>,

    /// 各需求的分配彙總
    pub materials: Vec<MaterialAllocation>,

    /// 警告信息
    pub warnings: Vec<PlanWarning>,
}

impl AllocationProposal {
    /// 創建空的分配結果
    pub fn empty() -> Self {
        Self::default()
    }

    /// 物料已分配總量
    pub fn total_for(&self, material_id: &str) -> Decimal {
        self.lines
            .iter()
            .filter(|l| l.material_id == material_id)
            .map(|l| l.quantity)
            .sum()
    }

    /// 指定物料的分配行
    pub fn lines_for<'a>(
        &'a self,
        material_id: &'a str,
    ) -> impl Iterator<Item = &'a AllocationLine> {
        self.lines.iter().filter(move |l| l.material_id == material_id)
    }

    /// 所有需求是否皆已滿足
    pub fn is_fully_allocated(&self) -> bool {
        self.materials.iter().all(|m| m.sufficient_stock)
    }
}

/// 手動選取（批次與數量）
#[derive(Debug, Clone, PartialEq)]
pub struct ManualSelection {
    pub lot_id: String,
    pub quantity: Decimal,
}

impl ManualSelection {
    pub fn new(lot_id: String, quantity: Decimal) -> Self {
        Self { lot_id, quantity }
    }
}

/// 分配引擎
#[derive(Debug, Clone, Copy)]
pub struct AllocationEngine {
    scale: u32,
}

impl AllocationEngine {
    /// 創建新的分配引擎
    pub fn new(scale: u32) -> Self {
        Self { scale }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.quantity_scale)
    }

    /// 依 BOM 需求建議耗用批次
    ///
    /// 每個需求所需數量 = 單位用量 × 目標產量 × 損耗係數；
    /// 同物料批次依收貨時間（再依批次ID）由舊到新貪婪耗用。
    /// 庫存不足時仍回傳已計算的分配行，由呼叫端決定是否阻擋提交。
    pub fn propose(
        &self,
        requirements: &[MaterialRequirement],
        target_quantity: Decimal,
        lots: &[InventoryLot],
    ) -> AllocationProposal {
        if requirements.is_empty() {
            return AllocationProposal::empty();
        }

        tracing::debug!(
            "開始分配：需求 {} 筆，候選批次 {} 筆，目標產量 {}",
            requirements.len(),
            lots.len(),
            target_quantity
        );

        let candidates = self.candidate_lots(lots);

        // 按物料分組（保留首次出現順序），不同物料互不影響可並行計算
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (idx, requirement) in requirements.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|(material, _)| *material == requirement.material_id)
            {
                Some((_, indices)) => indices.push(idx),
                None => groups.push((requirement.material_id.as_str(), vec![idx])),
            }
        }

        let mut allocated: Vec<(usize, Vec<AllocationLine>)> = groups
            .par_iter()
            .flat_map_iter(|(material, indices)| {
                let mut remaining: Vec<(&InventoryLot, Decimal)> = candidates
                    .get(material)
                    .map(|lots| {
                        lots.iter()
                            .map(|lot| (*lot, round_qty(lot.quantity, self.scale)))
                            .collect()
                    })
                    .unwrap_or_default();

                indices
                    .iter()
                    .map(|&idx| {
                        let needed = requirements[idx].needed_for(target_quantity, self.scale);
                        (idx, self.allocate_greedy(needed, &mut remaining))
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        allocated.sort_by_key(|(idx, _)| *idx);
        let lines: Vec<AllocationLine> =
            allocated.into_iter().flat_map(|(_, lines)| lines).collect();

        let (materials, warnings) = self.summarize(requirements, target_quantity, &lines);

        tracing::debug!(
            "分配完成：分配行 {} 筆，警告 {} 筆",
            lines.len(),
            warnings.len()
        );

        AllocationProposal {
            lines,
            materials,
            warnings,
        }
    }

    /// 套用手動選取
    ///
    /// 選取數量會被截斷至批次剩餘數量，不存在或不可分配的批次會被略過；
    /// 皆以警告回報而不是錯誤。同一批次多次選取會合併為一行。
    pub fn apply_manual(
        &self,
        requirements: &[MaterialRequirement],
        target_quantity: Decimal,
        selections: &[ManualSelection],
        lots: &[InventoryLot],
    ) -> AllocationProposal {
        let mut remaining: HashMap<&str, (&InventoryLot, Decimal)> = HashMap::new();
        for lot in lots.iter().filter(|lot| lot.is_allocatable()) {
            remaining
                .entry(lot.lot_id.as_str())
                .or_insert((lot, round_qty(lot.quantity, self.scale)));
        }

        let mut lines: Vec<AllocationLine> = Vec::new();
        let mut line_index: HashMap<String, usize> = HashMap::new();
        let mut warnings = Vec::new();

        for selection in selections {
            let Some((lot, left)) = remaining.get_mut(selection.lot_id.as_str()) else {
                tracing::warn!("手動選取的批次不存在或不可分配: {}", selection.lot_id);
                warnings.push(PlanWarning::warning(
                    selection.lot_id.clone(),
                    WarningKind::UnknownLot,
                    format!("批次 {} 不存在或不可分配，已略過", selection.lot_id),
                ));
                continue;
            };

            let requested = round_qty(selection.quantity, self.scale);
            let line = AllocationLine::new(
                lot.lot_id.clone(),
                lot.material_id.clone(),
                requested,
                *left,
                self.scale,
            );

            if line.quantity < requested {
                tracing::warn!(
                    "批次 {} 選取數量 {} 超過可用 {}，已截斷",
                    lot.lot_id,
                    requested,
                    left
                );
                warnings.push(PlanWarning::warning(
                    lot.lot_id.clone(),
                    WarningKind::QuantityClamped,
                    format!(
                        "批次 {} 選取數量 {} 超過可用 {}，已調整為 {}",
                        lot.lot_id, requested, left, line.quantity
                    ),
                ));
            }

            if line.is_empty() {
                continue;
            }

            *left -= line.quantity;
            match line_index.get(&line.lot_id) {
                Some(&idx) => lines[idx].quantity += line.quantity,
                None => {
                    line_index.insert(line.lot_id.clone(), lines.len());
                    lines.push(line);
                }
            }
        }

        let (materials, summary_warnings) = self.summarize(requirements, target_quantity, &lines);
        warnings.extend(summary_warnings);

        AllocationProposal {
            lines,
            materials,
            warnings,
        }
    }

    /// 依分配行計算各需求彙總與短缺警告
    ///
    /// 同物料多筆需求時，已分配數量依需求順序依次抵用。
    pub fn summarize(
        &self,
        requirements: &[MaterialRequirement],
        target_quantity: Decimal,
        lines: &[AllocationLine],
    ) -> (Vec<MaterialAllocation>, Vec<PlanWarning>) {
        let mut pool: HashMap<&str, Decimal> = HashMap::new();
        for line in lines {
            *pool.entry(line.material_id.as_str()).or_insert(Decimal::ZERO) += line.quantity;
        }

        let mut materials = Vec::with_capacity(requirements.len());
        let mut warnings = Vec::new();

        for requirement in requirements {
            let needed = requirement.needed_for(target_quantity, self.scale);
            let available = pool
                .get_mut(requirement.material_id.as_str())
                .map(|q| {
                    let taken = (*q).min(needed);
                    *q -= taken;
                    taken
                })
                .unwrap_or(Decimal::ZERO);

            let summary = MaterialAllocation::new(
                requirement.material_id.clone(),
                needed,
                available,
                requirement.mandatory,
            );

            if summary.mandatory && summary.is_unallocated() {
                warnings.push(PlanWarning::error(
                    summary.material_id.clone(),
                    WarningKind::UnallocatedMandatory,
                    format!("必要物料 {} 未分配任何批次（需要 {}）", summary.material_id, needed),
                ));
            } else if !summary.sufficient_stock {
                warnings.push(PlanWarning::warning(
                    summary.material_id.clone(),
                    WarningKind::StockShortfall,
                    format!(
                        "物料 {} 庫存不足：需要 {}, 已分配 {}, 短缺 {}",
                        summary.material_id,
                        needed,
                        summary.allocated_quantity,
                        summary.shortfall()
                    ),
                ));
            }

            materials.push(summary);
        }

        (materials, warnings)
    }

    /// 貪婪耗用候選批次
    fn allocate_greedy(
        &self,
        needed: Decimal,
        remaining: &mut [(&InventoryLot, Decimal)],
    ) -> Vec<AllocationLine> {
        let mut lines = Vec::new();
        let mut outstanding = needed;

        for (lot, left) in remaining.iter_mut() {
            if outstanding <= Decimal::ZERO {
                break;
            }
            // 已被同次計算的前一行耗盡
            if *left <= Decimal::ZERO {
                continue;
            }

            let line = AllocationLine::new(
                lot.lot_id.clone(),
                lot.material_id.clone(),
                outstanding,
                *left,
                self.scale,
            );
            if line.is_empty() {
                continue;
            }

            *left -= line.quantity;
            outstanding -= line.quantity;
            lines.push(line);
        }

        lines
    }

    /// 可分配批次，按物料分組並依（收貨時間, 批次ID）排序
    fn candidate_lots<'a>(
        &self,
        lots: &'a [InventoryLot],
    ) -> HashMap<&'a str, Vec<&'a InventoryLot>> {
        let mut grouped: HashMap<&str, Vec<&InventoryLot>> = HashMap::new();
        for lot in lots.iter().filter(|lot| lot.is_allocatable()) {
            let group = grouped.entry(lot.material_id.as_str()).or_default();
            if !group.iter().any(|existing| existing.lot_id == lot.lot_id) {
                group.push(lot);
            }
        }

        for group in grouped.values_mut() {
            group.sort_by(|a, b| {
                a.received_at
                    .cmp(&b.received_at)
                    .then_with(|| a.lot_id.cmp(&b.lot_id))
            });
        }

        grouped
    }
}

impl Default for AllocationEngine {
    fn default() -> Self {
        Self::new(mes_core::quantity::DEFAULT_QUANTITY_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use mes_core::LotState;

    fn lot(id: &str, material: &str, qty: i64, day: i64) -> InventoryLot {
        let base = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        InventoryLot::new(
            id.to_string(),
            material.to_string(),
            Decimal::from(qty),
            "kg".to_string(),
            base + Duration::days(day),
        )
    }

    fn requirement(material: &str, per_unit: i64) -> MaterialRequirement {
        MaterialRequirement::new(material.to_string(), Decimal::from(per_unit), "kg".to_string())
    }

    #[test]
    fn test_oldest_lot_first() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-2", "X", 40, 2), lot("LOT-1", "X", 30, 1)];

        let proposal = engine.propose(&[requirement("X", 50)], Decimal::ONE, &lots);

        assert_eq!(proposal.lines.len(), 2);
        assert_eq!(proposal.lines[0].lot_id, "LOT-1");
        assert_eq!(proposal.lines[0].quantity, Decimal::from(30));
        assert_eq!(proposal.lines[1].lot_id, "LOT-2");
        assert_eq!(proposal.lines[1].quantity, Decimal::from(20));
        assert_eq!(proposal.lines[1].remaining_after(), Decimal::from(20));
        assert!(proposal.is_fully_allocated());
        assert!(proposal.warnings.is_empty());
    }

    #[test]
    fn test_ties_broken_by_lot_id() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-B", "X", 10, 1), lot("LOT-A", "X", 10, 1)];

        let proposal = engine.propose(&[requirement("X", 5)], Decimal::ONE, &lots);

        assert_eq!(proposal.lines.len(), 1);
        assert_eq!(proposal.lines[0].lot_id, "LOT-A");
    }

    #[test]
    fn test_shortfall_returns_partial_lines() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-1", "X", 30, 1)];

        let proposal = engine.propose(&[requirement("X", 50)], Decimal::ONE, &lots);

        assert_eq!(proposal.lines.len(), 1);
        assert_eq!(proposal.total_for("X"), Decimal::from(30));
        assert!(!proposal.materials[0].sufficient_stock);
        assert_eq!(proposal.materials[0].shortfall(), Decimal::from(20));
        assert_eq!(proposal.warnings[0].kind, WarningKind::StockShortfall);
    }

    #[test]
    fn test_zero_requirements() {
        let engine = AllocationEngine::default();
        let proposal = engine.propose(&[], Decimal::from(10), &[lot("LOT-1", "X", 30, 1)]);

        assert!(proposal.lines.is_empty());
        assert!(proposal.materials.is_empty());
    }

    #[test]
    fn test_shared_material_skips_depleted_lot() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-1", "X", 30, 1), lot("LOT-2", "X", 40, 2)];
        let requirements = vec![requirement("X", 30), requirement("X", 20).with_level(2)];

        let proposal = engine.propose(&requirements, Decimal::ONE, &lots);

        // 第一筆需求耗盡 LOT-1，第二筆需求從 LOT-2 開始
        assert_eq!(proposal.lines.len(), 2);
        assert_eq!(proposal.lines[0].lot_id, "LOT-1");
        assert_eq!(proposal.lines[1].lot_id, "LOT-2");
        assert_eq!(proposal.lines[1].quantity, Decimal::from(20));
        assert!(proposal.is_fully_allocated());
    }

    #[test]
    fn test_yield_loss_applied() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-1", "X", 100, 1)];
        let requirements =
            vec![requirement("X", 2).with_yield_loss_ratio(Decimal::new(105, 2))];

        let proposal = engine.propose(&requirements, Decimal::from(10), &lots);

        // 2 × 10 × 1.05 = 21
        assert_eq!(proposal.total_for("X"), Decimal::from(21));
    }

    #[test]
    fn test_non_allocatable_lots_ignored() {
        let engine = AllocationEngine::default();
        let lots = vec![
            lot("LOT-1", "X", 30, 1).with_state(LotState::Blocked),
            lot("LOT-2", "X", 30, 2).with_state(LotState::Reserved),
        ];

        let proposal = engine.propose(&[requirement("X", 10)], Decimal::ONE, &lots);

        assert_eq!(proposal.lines.len(), 1);
        assert_eq!(proposal.lines[0].lot_id, "LOT-2");
    }

    #[test]
    fn test_unallocated_mandatory_flagged() {
        let engine = AllocationEngine::default();
        let proposal = engine.propose(
            &[requirement("X", 10), requirement("Y", 1).with_mandatory(false)],
            Decimal::ONE,
            &[],
        );

        assert_eq!(proposal.warnings.len(), 2);
        assert_eq!(proposal.warnings[0].kind, WarningKind::UnallocatedMandatory);
        assert_eq!(proposal.warnings[1].kind, WarningKind::StockShortfall);
    }

    #[test]
    fn test_manual_selection_is_clamped() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-1", "X", 30, 1), lot("LOT-2", "X", 40, 2)];
        let selections = vec![
            ManualSelection::new("LOT-2".to_string(), Decimal::from(45)),
            ManualSelection::new("LOT-1".to_string(), Decimal::from(10)),
            ManualSelection::new("LOT-9".to_string(), Decimal::from(10)),
        ];

        let proposal =
            engine.apply_manual(&[requirement("X", 50)], Decimal::ONE, &selections, &lots);

        assert_eq!(proposal.lines.len(), 2);
        assert_eq!(proposal.lines[0].lot_id, "LOT-2");
        assert_eq!(proposal.lines[0].quantity, Decimal::from(40));
        assert_eq!(proposal.total_for("X"), Decimal::from(50));
        assert!(proposal
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::QuantityClamped && w.subject == "LOT-2"));
        assert!(proposal
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::UnknownLot && w.subject == "LOT-9"));
    }

    #[test]
    fn test_manual_selection_merges_same_lot() {
        let engine = AllocationEngine::default();
        let lots = vec![lot("LOT-1", "X", 30, 1)];
        let selections = vec![
            ManualSelection::new("LOT-1".to_string(), Decimal::from(20)),
            ManualSelection::new("LOT-1".to_string(), Decimal::from(20)),
        ];

        let proposal = engine.apply_manual(&[], Decimal::ONE, &selections, &lots);

        assert_eq!(proposal.lines.len(), 1);
        assert_eq!(proposal.lines[0].quantity, Decimal::from(30));
        assert_eq!(proposal.lines[0].available_at_selection, Decimal::from(30));
    }
}
