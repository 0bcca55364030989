//! 提交驗證錯誤

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 阻擋提交的驗證錯誤（可對應到具體欄位）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("至少需選擇一台設備")]
    MissingEquipment,

    #[error("至少需選擇一位操作員")]
    MissingOperator,

    #[error("設備不存在或不可用: {0}")]
    UnknownEquipment(String),

    #[error("操作員不存在或未啟用: {0}")]
    UnknownOperator(String),

    #[error("結束時間必須晚於開始時間")]
    InvalidTimeRange,

    #[error("開始時間不可晚於現在")]
    StartInFuture,

    #[error("延誤 {0} 分鐘時必須填寫延誤原因")]
    MissingDelayReason(u32),

    #[error("產出數量必須大於零")]
    NonPositiveQuantity,

    #[error("報廢數量不可為負數")]
    NegativeScrap,

    #[error("產出數量 {produced} 超過剩餘可報工數量 {remaining}")]
    ExceedsRemainingQuantity { produced: Decimal, remaining: Decimal },

    #[error("必要物料未分配任何批次: {0}")]
    UnallocatedMandatoryMaterial(String),

    #[error("駁回原因不可為空")]
    MissingRejectionReason,
}

impl ValidationError {
    /// 對應的欄位名稱
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingEquipment | ValidationError::UnknownEquipment(_) => {
                "equipment_ids"
            }
            ValidationError::MissingOperator | ValidationError::UnknownOperator(_) => {
                "operator_ids"
            }
            ValidationError::InvalidTimeRange => "end_time",
            ValidationError::StartInFuture => "start_time",
            ValidationError::MissingDelayReason(_) => "delay_reason",
            ValidationError::NonPositiveQuantity
            | ValidationError::ExceedsRemainingQuantity { .. } => "produced_quantity",
            ValidationError::NegativeScrap => "scrap_quantity",
            ValidationError::UnallocatedMandatoryMaterial(_) => "consumed_lines",
            ValidationError::MissingRejectionReason => "reason",
        }
    }
}

/// 將多個驗證錯誤合併為一行訊息
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field(), e))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_attribution() {
        assert_eq!(ValidationError::MissingEquipment.field(), "equipment_ids");
        assert_eq!(ValidationError::MissingDelayReason(10).field(), "delay_reason");
        assert_eq!(ValidationError::StartInFuture.field(), "start_time");
    }

    #[test]
    fn test_describe() {
        let message = describe(&[
            ValidationError::MissingOperator,
            ValidationError::InvalidTimeRange,
        ]);
        assert!(message.starts_with("operator_ids: "));
        assert!(message.contains("end_time: "));
    }
}
