//! 庫存批次模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 批次生命週期狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotState {
    /// 可用
    Available,
    /// 已預留（建議性）
    Reserved,
    /// 已耗用
    Consumed,
    /// 凍結
    Blocked,
    /// 報廢
    Scrapped,
}

impl LotState {
    /// 檢查狀態轉換是否合法
    ///
    /// 除 RESERVED ⇄ AVAILABLE 外，狀態只能單向前進。
    pub fn can_transition_to(self, next: LotState) -> bool {
        use LotState::*;
        match (self, next) {
            (Available, Reserved) | (Reserved, Available) => true,
            (Available | Reserved, Consumed | Blocked | Scrapped) => true,
            (Blocked, Scrapped) => true,
            _ => false,
        }
    }

    /// 是否可被分配耗用
    pub fn is_allocatable(self) -> bool {
        matches!(self, LotState::Available | LotState::Reserved)
    }

    /// 是否為終止狀態
    pub fn is_terminal(self) -> bool {
        matches!(self, LotState::Consumed | LotState::Scrapped)
    }
}

impl std::fmt::Display for LotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LotState::Available => "AVAILABLE",
            LotState::Reserved => "RESERVED",
            LotState::Consumed => "CONSUMED",
            LotState::Blocked => "BLOCKED",
            LotState::Scrapped => "SCRAPPED",
        };
        f.write_str(label)
    }
}

/// 庫存帳對批次的狀態操作（用於狀態錯誤）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LotAction {
    /// 回補
    Restore,
    /// 凍結
    Invalidate,
    /// 解除凍結
    Reinstate,
}

impl std::fmt::Display for LotAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LotAction::Restore => "回補",
            LotAction::Invalidate => "凍結",
            LotAction::Reinstate => "解除凍結",
        };
        f.write_str(label)
    }
}

/// 庫存批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLot {
    /// 批次ID
    pub lot_id: String,

    /// 物料ID
    pub material_id: String,

    /// 現有數量
    pub quantity: Decimal,

    /// 單位
    pub unit: String,

    /// 狀態
    pub state: LotState,

    /// 儲位
    pub location: Option<String>,

    /// 收貨時間（先進先出排序依據）
    pub received_at: DateTime<Utc>,
}

impl InventoryLot {
    /// 創建新的可用批次
    pub fn new(
        lot_id: String,
        material_id: String,
        quantity: Decimal,
        unit: String,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lot_id,
            material_id,
            quantity: quantity.max(Decimal::ZERO),
            unit,
            state: LotState::Available,
            location: None,
            received_at,
        }
    }

    /// 建構器模式：設置狀態
    pub fn with_state(mut self, state: LotState) -> Self {
        self.state = state;
        self
    }

    /// 建構器模式：設置儲位
    pub fn with_location(mut self, location: String) -> Self {
        self.location = Some(location);
        self
    }

    /// 是否可被分配（狀態可用且數量大於零）
    pub fn is_allocatable(&self) -> bool {
        self.state.is_allocatable() && self.quantity > Decimal::ZERO
    }

    /// 嘗試轉換狀態，非法轉換回傳 false 且不改變狀態
    pub fn transition(&mut self, next: LotState) -> bool {
        if self.state == next {
            return true;
        }
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_lot() -> InventoryLot {
        InventoryLot::new(
            "LOT-001".to_string(),
            "STEEL".to_string(),
            Decimal::from(30),
            "kg".to_string(),
            Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_create_lot() {
        let lot = sample_lot().with_location("WH-A".to_string());

        assert_eq!(lot.state, LotState::Available);
        assert_eq!(lot.location, Some("WH-A".to_string()));
        assert!(lot.is_allocatable());
    }

    #[test]
    fn test_negative_quantity_clamped() {
        let lot = InventoryLot::new(
            "LOT-NEG".to_string(),
            "STEEL".to_string(),
            Decimal::from(-3),
            "kg".to_string(),
            Utc::now(),
        );
        assert_eq!(lot.quantity, Decimal::ZERO);
        assert!(!lot.is_allocatable());
    }

    #[test]
    fn test_state_transitions_are_monotonic() {
        let mut lot = sample_lot();

        assert!(lot.transition(LotState::Reserved));
        assert!(lot.transition(LotState::Available));
        assert!(lot.transition(LotState::Consumed));

        // 已耗用不可回到可用
        assert!(!lot.transition(LotState::Available));
        assert_eq!(lot.state, LotState::Consumed);
    }

    #[test]
    fn test_blocked_can_only_be_scrapped() {
        assert!(LotState::Blocked.can_transition_to(LotState::Scrapped));
        assert!(!LotState::Blocked.can_transition_to(LotState::Available));
        assert!(!LotState::Scrapped.can_transition_to(LotState::Blocked));
    }
}
