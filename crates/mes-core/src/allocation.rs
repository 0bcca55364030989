//! 耗用分配模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quantity::clamp_non_negative;

/// 分配行：對單一批次的建議或確認耗用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    /// 批次ID
    pub lot_id: String,

    /// 物料ID
    pub material_id: String,

    /// 耗用數量
    pub quantity: Decimal,

    /// 選取當下批次可用數量
    pub available_at_selection: Decimal,
}

impl AllocationLine {
    /// 創建分配行，耗用數量會被限制在 `[0, available]` 內
    pub fn new(
        lot_id: String,
        material_id: String,
        requested: Decimal,
        available: Decimal,
        scale: u32,
    ) -> Self {
        let available_at_selection = clamp_non_negative(available, scale);
        let quantity = clamp_non_negative(requested, scale).min(available_at_selection);
        Self {
            lot_id,
            material_id,
            quantity,
            available_at_selection,
        }
    }

    /// 此行耗用後批次剩餘數量
    pub fn remaining_after(&self) -> Decimal {
        self.available_at_selection - self.quantity
    }

    /// 是否為零耗用
    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// 單一物料的分配彙總
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAllocation {
    /// 物料ID
    pub material_id: String,

    /// 需求數量
    pub required_quantity: Decimal,

    /// 已分配數量
    pub allocated_quantity: Decimal,

    /// 庫存是否足夠
    pub sufficient_stock: bool,

    /// 是否為必要物料
    pub mandatory: bool,
}

impl MaterialAllocation {
    /// 依需求與已分配數量創建彙總
    pub fn new(
        material_id: String,
        required_quantity: Decimal,
        allocated_quantity: Decimal,
        mandatory: bool,
    ) -> Self {
        Self {
            material_id,
            required_quantity,
            allocated_quantity,
            sufficient_stock: allocated_quantity >= required_quantity,
            mandatory,
        }
    }

    /// 短缺數量
    pub fn shortfall(&self) -> Decimal {
        (self.required_quantity - self.allocated_quantity).max(Decimal::ZERO)
    }

    /// 是否完全未分配
    pub fn is_unallocated(&self) -> bool {
        self.allocated_quantity.is_zero() && self.required_quantity > Decimal::ZERO
    }
}
