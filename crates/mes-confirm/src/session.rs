//! 分配作業階段
//!
//! 一個操作員對一個作業的報工過程：建議分配、手動調整、預留、提交或取消。
//! 階段本身只是值，所有副作用由 [`crate::ConfirmationService`] 執行。

use chrono::{DateTime, Utc};
use mes_calc::{AllocationProposal, PlanWarning};
use mes_core::{
    AllocationLine, HolderId, InventoryLot, MaterialAllocation, MaterialRequirement,
    OperationContext,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 作業階段狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// 進行中
    Open,
    /// 已提交（確認或部分確認）
    Submitted,
    /// 已駁回
    Rejected,
    /// 已取消
    Cancelled,
}

/// 分配作業階段
#[derive(Debug, Clone)]
pub struct AllocationSession {
    pub(crate) holder: HolderId,
    pub(crate) context: OperationContext,

    /// 開始時作業的剩餘數量
    pub(crate) target_quantity: Decimal,

    /// 分配計算所用產量（預設為剩餘數量）
    pub(crate) planned_quantity: Decimal,

    pub(crate) requirements: Vec<MaterialRequirement>,

    /// 可用批次快照
    pub(crate) lots: Vec<InventoryLot>,

    pub(crate) proposal: AllocationProposal,

    /// 分配來自手動選取（提交時不依產量重新計算）
    pub(crate) manual: bool,

    /// 預留衝突警告（依批次）
    pub(crate) conflicts: BTreeMap<String, PlanWarning>,

    /// 本階段持有預留的批次
    pub(crate) reserved_lots: BTreeSet<String>,

    pub(crate) state: SessionState,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) last_activity_at: DateTime<Utc>,
}

impl AllocationSession {
    pub(crate) fn new(
        holder: HolderId,
        context: OperationContext,
        target_quantity: Decimal,
        requirements: Vec<MaterialRequirement>,
        lots: Vec<InventoryLot>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            holder,
            context,
            target_quantity,
            planned_quantity: target_quantity,
            requirements,
            lots,
            proposal: AllocationProposal::empty(),
            manual: false,
            conflicts: BTreeMap::new(),
            reserved_lots: BTreeSet::new(),
            state: SessionState::Open,
            started_at: now,
            last_activity_at: now,
        }
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn target_quantity(&self) -> Decimal {
        self.target_quantity
    }

    pub fn planned_quantity(&self) -> Decimal {
        self.planned_quantity
    }

    pub fn requirements(&self) -> &[MaterialRequirement] {
        &self.requirements
    }

    pub fn lots(&self) -> &[InventoryLot] {
        &self.lots
    }

    pub fn lines(&self) -> &[AllocationLine] {
        &self.proposal.lines
    }

    pub fn materials(&self) -> &[MaterialAllocation] {
        &self.proposal.materials
    }

    pub fn proposal(&self) -> &AllocationProposal {
        &self.proposal
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// 分配警告與預留衝突警告
    pub fn warnings(&self) -> Vec<PlanWarning> {
        self.proposal
            .warnings
            .iter()
            .chain(self.conflicts.values())
            .cloned()
            .collect()
    }

    /// 預留衝突的批次
    pub fn conflicting_lots(&self) -> Vec<&str> {
        self.conflicts.keys().map(String::as_str).collect()
    }

    pub fn reserved_lots(&self) -> &BTreeSet<String> {
        &self.reserved_lots
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// 物料需求涉及的物料ID（去重，維持順序）
    pub(crate) fn material_ids(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.requirements
            .iter()
            .filter(|r| seen.insert(r.material_id.clone()))
            .map(|r| r.material_id.clone())
            .collect()
    }

    /// 各批次目前的耗用數量
    pub(crate) fn line_quantities(&self) -> BTreeMap<String, Decimal> {
        let mut quantities = BTreeMap::new();
        for line in &self.proposal.lines {
            *quantities.entry(line.lot_id.clone()).or_insert(Decimal::ZERO) += line.quantity;
        }
        quantities
    }
}
