//! 批量配置與拆批計劃

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 批量大小配置（依作業類型與產品）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSizeConfig {
    /// 作業類型
    pub operation_type: String,

    /// 產品ID
    pub product_id: String,

    /// 最小批量
    pub min_batch_size: Decimal,

    /// 最大批量（0 表示不限制）
    pub max_batch_size: Decimal,

    /// 建議批量
    pub preferred_batch_size: Option<Decimal>,

    /// 單位
    pub unit: String,
}

impl BatchSizeConfig {
    /// 創建新的批量配置
    pub fn new(
        operation_type: String,
        product_id: String,
        min_batch_size: Decimal,
        max_batch_size: Decimal,
        unit: String,
    ) -> Self {
        Self {
            operation_type,
            product_id,
            min_batch_size,
            max_batch_size,
            preferred_batch_size: None,
            unit,
        }
    }

    /// 建構器模式：設置建議批量
    pub fn with_preferred_batch_size(mut self, preferred: Decimal) -> Self {
        self.preferred_batch_size = Some(preferred);
        self
    }

    /// 是否設有上限
    pub fn has_max(&self) -> bool {
        self.max_batch_size > Decimal::ZERO
    }

    /// 最小值大於最大值（配置錯誤）
    pub fn is_misconfigured(&self) -> bool {
        self.has_max() && self.min_batch_size > self.max_batch_size
    }

    /// 配置鍵
    pub fn key(&self) -> (String, String) {
        (self.operation_type.clone(), self.product_id.clone())
    }
}

/// 拆批計劃（依序的子批數量，總和等於需求數量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSplitPlan {
    pub batches: Vec<Decimal>,
}

impl BatchSplitPlan {
    pub fn new(batches: Vec<Decimal>) -> Self {
        Self { batches }
    }

    /// 子批總數量
    pub fn total(&self) -> Decimal {
        self.batches.iter().copied().sum()
    }

    /// 子批數
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// 最大子批數量
    pub fn max_batch(&self) -> Decimal {
        self.batches.iter().copied().max().unwrap_or(Decimal::ZERO)
    }

    /// 最小子批數量
    pub fn min_batch(&self) -> Decimal {
        self.batches.iter().copied().min().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misconfigured_bounds() {
        let config = BatchSizeConfig::new(
            "MIXING".to_string(),
            "PASTE-01".to_string(),
            Decimal::from(500),
            Decimal::from(400),
            "kg".to_string(),
        );
        assert!(config.is_misconfigured());

        let unbounded = BatchSizeConfig::new(
            "MIXING".to_string(),
            "PASTE-02".to_string(),
            Decimal::from(500),
            Decimal::ZERO,
            "kg".to_string(),
        );
        assert!(!unbounded.has_max());
        assert!(!unbounded.is_misconfigured());
    }

    #[test]
    fn test_plan_totals() {
        let plan = BatchSplitPlan::new(vec![
            Decimal::from(400),
            Decimal::from(400),
            Decimal::from(150),
        ]);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total(), Decimal::from(950));
        assert_eq!(plan.max_batch(), Decimal::from(400));
        assert_eq!(plan.min_batch(), Decimal::from(150));
    }
}
