//! 數量精度與捨入

use rust_decimal::{Decimal, RoundingStrategy};

/// 預設最小數量解析度（小數位數，3 位 = 0.001 單位）
pub const DEFAULT_QUANTITY_SCALE: u32 = 3;

/// 允許的最大小數位數
pub const MAX_QUANTITY_SCALE: u32 = 12;

/// 依最小解析度四捨五入（half-up），小數位數上限為 [`MAX_QUANTITY_SCALE`]
pub fn round_qty(quantity: Decimal, scale: u32) -> Decimal {
    quantity.round_dp_with_strategy(
        scale.min(MAX_QUANTITY_SCALE),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// 最小解析度單位（例如 scale = 3 時為 0.001）
pub fn resolution(scale: u32) -> Decimal {
    Decimal::new(1, scale.min(MAX_QUANTITY_SCALE))
}

/// 捨入並截斷負值
pub fn clamp_non_negative(quantity: Decimal, scale: u32) -> Decimal {
    round_qty(quantity, scale).max(Decimal::ZERO)
}
