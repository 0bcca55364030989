//! # MES Calculation Engine
//!
//! 耗用分配、拆批規劃與報工驗證（純計算，不觸及共享狀態）

pub mod allocation;
pub mod batch_split;
pub mod validation;

// Re-export 主要類型
pub use allocation::{AllocationEngine, AllocationProposal, ManualSelection};
pub use batch_split::{BatchSizePlanner, SplitPreview, SplitStrategy};
pub use validation::{ConfirmationValidator, ValidationContext, ValidationReport};

/// 規劃警告（不阻擋操作員繼續）
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlanWarning {
    /// 對象（物料、批次或產品）
    pub subject: String,
    pub kind: WarningKind,
    pub message: String,
    pub severity: WarningSeverity,
}

impl PlanWarning {
    pub fn new(
        subject: String,
        kind: WarningKind,
        message: String,
        severity: WarningSeverity,
    ) -> Self {
        Self {
            subject,
            kind,
            message,
            severity,
        }
    }

    pub fn info(subject: String, kind: WarningKind, message: String) -> Self {
        Self::new(subject, kind, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, kind: WarningKind, message: String) -> Self {
        Self::new(subject, kind, message, WarningSeverity::Warning)
    }

    pub fn error(subject: String, kind: WarningKind, message: String) -> Self {
        Self::new(subject, kind, message, WarningSeverity::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WarningSeverity {
    Info,
    Warning,
    Error,
}

/// 警告類別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum WarningKind {
    /// 庫存不足
    StockShortfall,
    /// 必要物料未分配
    UnallocatedMandatory,
    /// 預留衝突
    ReservationConflict,
    /// 選取數量被截斷
    QuantityClamped,
    /// 耗用超過實際產量所需
    ExcessConsumption,
    /// 批次不存在或不可分配
    UnknownLot,
    /// 低於最小批量
    BelowMinBatch,
    /// 超過最大批量
    AboveMaxBatch,
    /// 批量配置錯誤（最小值大於最大值）
    BatchConfigMisconfigured,
}
