//! 批量檢查與拆批規劃

use mes_core::quantity::{resolution, round_qty};
use mes_core::{BatchSizeConfig, BatchSplitPlan, EngineConfig};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::{PlanWarning, WarningKind};

/// 拆批策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// 平均分配，子批之間最多相差一個最小解析度單位
    #[default]
    Even,
    /// 優先以建議批量填滿，餘數放最後一批（不增加批數時才採用）
    PreferredFill,
}

/// 拆批預覽
#[derive(Debug, Clone, PartialEq)]
pub struct SplitPreview {
    /// 適用的批量配置
    pub config: Option<BatchSizeConfig>,

    /// 批量警告
    pub warnings: Vec<PlanWarning>,

    /// 拆批計劃（不需拆批時為 None）
    pub plan: Option<BatchSplitPlan>,
}

impl SplitPreview {
    /// 產出批次數量（不拆批時為 1）
    pub fn batch_count(&self) -> usize {
        self.plan.as_ref().map(|p| p.len()).unwrap_or(1)
    }
}

/// 批量規劃器
#[derive(Debug, Clone, Default)]
pub struct BatchSizePlanner {
    /// 依（作業類型, 產品）索引的批量配置
    configs: HashMap<(String, String), BatchSizeConfig>,

    scale: u32,
}

impl BatchSizePlanner {
    /// 創建新的批量規劃器
    pub fn new(configs: Vec<BatchSizeConfig>, scale: u32) -> Self {
        let configs = configs.into_iter().map(|c| (c.key(), c)).collect();
        Self { configs, scale }
    }

    pub fn from_config(configs: Vec<BatchSizeConfig>, config: &EngineConfig) -> Self {
        Self::new(configs, config.quantity_scale)
    }

    /// 新增或取代批量配置
    pub fn upsert_config(&mut self, config: BatchSizeConfig) {
        self.configs.insert(config.key(), config);
    }

    /// 查詢批量配置
    pub fn check_config(&self, operation_type: &str, product_id: &str) -> Option<&BatchSizeConfig> {
        self.configs
            .get(&(operation_type.to_string(), product_id.to_string()))
    }

    /// 檢查數量是否超出批量範圍（只回傳警告，不阻擋）
    pub fn validate(&self, quantity: Decimal, config: &BatchSizeConfig) -> Vec<PlanWarning> {
        let mut warnings = Vec::new();
        let subject = config.product_id.clone();

        if config.is_misconfigured() {
            warnings.push(PlanWarning::error(
                subject.clone(),
                WarningKind::BatchConfigMisconfigured,
                format!(
                    "批量配置錯誤：最小批量 {} {} 大於最大批量 {} {}",
                    config.min_batch_size, config.unit, config.max_batch_size, config.unit
                ),
            ));
        }

        if config.min_batch_size > Decimal::ZERO && quantity < config.min_batch_size {
            warnings.push(PlanWarning::warning(
                subject.clone(),
                WarningKind::BelowMinBatch,
                format!(
                    "數量 {} 低於最小批量 {} {}",
                    quantity, config.min_batch_size, config.unit
                ),
            ));
        }

        if config.has_max() && quantity > config.max_batch_size {
            warnings.push(PlanWarning::warning(
                subject,
                WarningKind::AboveMaxBatch,
                format!(
                    "數量 {} 超過最大批量 {} {}，將拆為多批",
                    quantity, config.max_batch_size, config.unit
                ),
            ));
        }

        warnings
    }

    /// 計算平均拆批計劃
    pub fn plan_split(&self, quantity: Decimal, config: &BatchSizeConfig) -> Option<BatchSplitPlan> {
        self.plan_split_with(quantity, config, SplitStrategy::Even)
    }

    /// 依指定策略計算拆批計劃
    ///
    /// 只有在設有上限且數量超過上限時才拆批；批數 = ceil(數量 / 上限)，
    /// 批數為 1 時回傳 None。
    pub fn plan_split_with(
        &self,
        quantity: Decimal,
        config: &BatchSizeConfig,
        strategy: SplitStrategy,
    ) -> Option<BatchSplitPlan> {
        let quantity = round_qty(quantity, self.scale);
        let max = round_qty(config.max_batch_size, self.scale);
        if max <= Decimal::ZERO || quantity <= max {
            return None;
        }

        let Some(batch_count) = quantity.checked_div(max).and_then(|r| r.ceil().to_u64()) else {
            tracing::warn!("拆批：數量 {} 上限 {} 超出可計算範圍", quantity, max);
            return None;
        };
        if batch_count <= 1 {
            return None;
        }

        let plan = match strategy {
            SplitStrategy::PreferredFill => self
                .preferred_fill(quantity, max, batch_count, config)
                .or_else(|| self.even_split(quantity, batch_count)),
            SplitStrategy::Even => self.even_split(quantity, batch_count),
        };
        let Some(plan) = plan else {
            tracing::warn!(
                "拆批：數量 {} 以解析度 {} 計算超出範圍",
                quantity,
                resolution(self.scale)
            );
            return None;
        };

        tracing::debug!(
            "拆批：數量 {} 上限 {} → {} 批 {:?}",
            quantity,
            max,
            plan.len(),
            plan.batches
        );

        Some(plan)
    }

    /// 查詢配置、產生警告與拆批計劃
    pub fn preview(
        &self,
        operation_type: &str,
        product_id: &str,
        quantity: Decimal,
        strategy: SplitStrategy,
    ) -> SplitPreview {
        match self.check_config(operation_type, product_id) {
            Some(config) => SplitPreview {
                config: Some(config.clone()),
                warnings: self.validate(quantity, config),
                plan: self.plan_split_with(quantity, config, strategy),
            },
            None => {
                tracing::debug!("無批量配置: {} / {}", operation_type, product_id);
                SplitPreview {
                    config: None,
                    warnings: Vec::new(),
                    plan: None,
                }
            }
        }
    }

    /// 以最小解析度單位平均分配，餘數逐一分給前面的子批
    ///
    /// 全程以 `Decimal` 計算，解析度單位數超過 `u64` 時仍正確。
    fn even_split(&self, quantity: Decimal, batch_count: u64) -> Option<BatchSplitPlan> {
        let unit = resolution(self.scale);
        let total_units = quantity.checked_div(unit)?.trunc();
        let count = Decimal::from(batch_count);

        let mut base = total_units.checked_div(count)?.floor();
        let mut remainder = total_units - base * count;
        // 28 位有效數字的除法可能進位到下一個整數
        while remainder < Decimal::ZERO {
            base -= Decimal::ONE;
            remainder += count;
        }
        while remainder >= count {
            base += Decimal::ONE;
            remainder -= count;
        }

        let batches = (0..batch_count)
            .map(|i| {
                let units = if Decimal::from(i) < remainder {
                    base + Decimal::ONE
                } else {
                    base
                };
                (units * unit).normalize()
            })
            .collect();

        Some(BatchSplitPlan::new(batches))
    }

    fn preferred_fill(
        &self,
        quantity: Decimal,
        max: Decimal,
        batch_count: u64,
        config: &BatchSizeConfig,
    ) -> Option<BatchSplitPlan> {
        let preferred = round_qty(config.preferred_batch_size?, self.scale);
        if preferred <= Decimal::ZERO || preferred > max {
            return None;
        }

        // 使用建議批量不可增加批數
        if quantity.checked_div(preferred)?.ceil().to_u64()? != batch_count {
            return None;
        }

        let full_batches = batch_count - 1;
        let last = quantity - preferred * Decimal::from(full_batches);
        let mut batches = vec![preferred.normalize(); full_batches as usize];
        batches.push(last.normalize());

        Some(BatchSplitPlan::new(batches))
    }
}
