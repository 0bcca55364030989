//! BOM 物料需求模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quantity::round_qty;

/// 物料需求（每單位產出所需用量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    /// 物料ID
    pub material_id: String,

    /// 每單位產出用量
    pub quantity_per_unit: Decimal,

    /// 損耗係數（≥ 1）
    pub yield_loss_ratio: Decimal,

    /// BOM 層級
    pub level: u32,

    /// 是否為必要物料
    pub mandatory: bool,

    /// 單位
    pub unit: String,
}

impl MaterialRequirement {
    /// 創建新的物料需求
    pub fn new(material_id: String, quantity_per_unit: Decimal, unit: String) -> Self {
        Self {
            material_id,
            quantity_per_unit,
            yield_loss_ratio: Decimal::ONE,
            level: 1,
            mandatory: true,
            unit,
        }
    }

    /// 建構器模式：設置損耗係數
    pub fn with_yield_loss_ratio(mut self, ratio: Decimal) -> Self {
        self.yield_loss_ratio = ratio;
        self
    }

    /// 建構器模式：設置 BOM 層級
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// 建構器模式：設置是否必要
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// 有效損耗係數，低於 1 視為 1
    pub fn effective_yield_loss_ratio(&self) -> Decimal {
        self.yield_loss_ratio.max(Decimal::ONE)
    }

    /// 計算目標產量所需數量 = 單位用量 × 目標產量 × 損耗係數
    pub fn needed_for(&self, target_quantity: Decimal, scale: u32) -> Decimal {
        let needed =
            self.quantity_per_unit * target_quantity * self.effective_yield_loss_ratio();
        round_qty(needed, scale).max(Decimal::ZERO)
    }
}
