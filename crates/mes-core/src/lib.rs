//! # MES Core
//!
//! 報工規劃引擎的核心資料模型與類型定義

pub mod allocation;
pub mod batch;
pub mod clock;
pub mod config;
pub mod confirmation;
pub mod lot;
pub mod quantity;
pub mod requirement;
pub mod reservation;
pub mod validation;

// Re-export 主要類型
pub use allocation::{AllocationLine, MaterialAllocation};
pub use batch::{BatchSizeConfig, BatchSplitPlan};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use confirmation::{
    ConfirmationStatus, DelayInfo, OperationContext, OutputBatch, ProductionConfirmation,
    RejectRequest, RejectionInfo, ReversalInfo, SubmitRequest,
};
pub use lot::{InventoryLot, LotAction, LotState};
pub use requirement::MaterialRequirement;
pub use reservation::{HolderId, Reservation};
pub use validation::ValidationError;

use rust_decimal::Decimal;
use uuid::Uuid;

/// 報工引擎錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum MesError {
    #[error("驗證失敗: {}", validation::describe(.0))]
    Validation(Vec<ValidationError>),

    #[error("批次 {lot_id} 已被 {holder} 預留")]
    Conflict { lot_id: String, holder: HolderId },

    #[error("批次 {lot_id} 數量不足：需要 {requested}, 可用 {available}")]
    InsufficientQuantity {
        lot_id: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("報工 {confirmation_id} 不可沖銷: {reason}")]
    IneligibleReversal { confirmation_id: Uuid, reason: String },

    #[error("非法狀態轉換: {from} → {to}")]
    InvalidTransition {
        from: ConfirmationStatus,
        to: ConfirmationStatus,
    },

    #[error("找不到批次: {0}")]
    LotNotFound(String),

    #[error("批次已存在: {0}")]
    DuplicateLot(String),

    #[error("批次 {lot_id} 狀態為 {state}，不可{action}")]
    InvalidLotState {
        lot_id: String,
        state: LotState,
        action: LotAction,
    },

    #[error("找不到報工記錄: {0}")]
    ConfirmationNotFound(Uuid),

    #[error("報工記錄已存在: {0}")]
    DuplicateConfirmation(Uuid),

    #[error("找不到配置: {0}")]
    ConfigNotFound(String),

    #[error("作業階段已結束: {0}")]
    SessionClosed(String),

    #[error("配置錯誤: {0}")]
    Config(String),

    #[error("其他錯誤: {0}")]
    Other(String),
}

impl MesError {
    /// 驗證錯誤清單（非驗證錯誤時為空）
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            MesError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, MesError>;
