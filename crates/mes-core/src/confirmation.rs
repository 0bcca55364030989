//! 生產報工記錄與狀態機

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocation::AllocationLine;
use crate::{MesError, Result};

/// 報工狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStatus {
    /// 待審核
    PendingReview,
    /// 已確認
    Confirmed,
    /// 部分確認
    PartiallyConfirmed,
    /// 已駁回
    Rejected,
    /// 已沖銷
    Reversed,
}

impl ConfirmationStatus {
    /// 檢查狀態轉換是否合法
    pub fn can_transition_to(self, next: ConfirmationStatus) -> bool {
        use ConfirmationStatus::*;
        matches!(
            (self, next),
            (PendingReview, Confirmed | PartiallyConfirmed | Rejected)
                | (Confirmed | PartiallyConfirmed, Reversed)
        )
    }

    /// 是否為終止狀態（無後續轉換）
    pub fn is_terminal(self) -> bool {
        matches!(self, ConfirmationStatus::Rejected | ConfirmationStatus::Reversed)
    }

    /// 是否可沖銷
    pub fn is_reversible(self) -> bool {
        self.can_transition_to(ConfirmationStatus::Reversed)
    }

    /// 是否計入已完成產量
    pub fn counts_as_produced(self) -> bool {
        matches!(
            self,
            ConfirmationStatus::Confirmed | ConfirmationStatus::PartiallyConfirmed
        )
    }

    /// 所有狀態
    pub fn all() -> [ConfirmationStatus; 5] {
        use ConfirmationStatus::*;
        [PendingReview, Confirmed, PartiallyConfirmed, Rejected, Reversed]
    }
}

impl std::fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConfirmationStatus::PendingReview => "PENDING_REVIEW",
            ConfirmationStatus::Confirmed => "CONFIRMED",
            ConfirmationStatus::PartiallyConfirmed => "PARTIALLY_CONFIRMED",
            ConfirmationStatus::Rejected => "REJECTED",
            ConfirmationStatus::Reversed => "REVERSED",
        };
        f.write_str(label)
    }
}

/// 作業上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    /// 作業ID
    pub operation_id: String,

    /// 作業類型
    pub operation_type: String,

    /// 產品ID
    pub product_id: String,

    /// 目標產量
    pub target_quantity: Decimal,
}

impl OperationContext {
    pub fn new(
        operation_id: String,
        operation_type: String,
        product_id: String,
        target_quantity: Decimal,
    ) -> Self {
        Self {
            operation_id,
            operation_type,
            product_id,
            target_quantity,
        }
    }
}

/// 延誤資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayInfo {
    pub minutes: u32,
    pub reason: Option<String>,
}

/// 產出批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputBatch {
    /// 批號
    pub batch_number: String,

    /// 數量
    pub quantity: Decimal,
}

/// 駁回資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionInfo {
    pub reason: String,
    pub rejected_by: String,
    pub rejected_at: DateTime<Utc>,
}

/// 沖銷資訊
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalInfo {
    pub reason: String,
    pub notes: Option<String>,
    pub reversed_by: String,
    pub reversed_at: DateTime<Utc>,
}

/// 報工提交請求（操作員輸入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// 產出數量
    pub produced_quantity: Decimal,

    /// 報廢數量
    pub scrap_quantity: Decimal,

    /// 開始時間
    pub start_time: DateTime<Utc>,

    /// 結束時間
    pub end_time: DateTime<Utc>,

    /// 設備
    pub equipment_ids: Vec<String>,

    /// 操作員
    pub operator_ids: Vec<String>,

    /// 延誤分鐘
    pub delay_minutes: u32,

    /// 延誤原因
    pub delay_reason: Option<String>,

    /// 是否以部分確認儲存
    pub save_as_partial: bool,

    /// 備註
    pub notes: Option<String>,

    /// 提交人
    pub submitted_by: String,
}

impl SubmitRequest {
    /// 創建新的提交請求
    pub fn new(
        produced_quantity: Decimal,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        submitted_by: String,
    ) -> Self {
        Self {
            produced_quantity,
            scrap_quantity: Decimal::ZERO,
            start_time,
            end_time,
            equipment_ids: Vec::new(),
            operator_ids: Vec::new(),
            delay_minutes: 0,
            delay_reason: None,
            save_as_partial: false,
            notes: None,
            submitted_by,
        }
    }

    /// 建構器模式：設置設備
    pub fn with_equipment(mut self, equipment_ids: Vec<String>) -> Self {
        self.equipment_ids = equipment_ids;
        self
    }

    /// 建構器模式：設置操作員
    pub fn with_operators(mut self, operator_ids: Vec<String>) -> Self {
        self.operator_ids = operator_ids;
        self
    }

    /// 建構器模式：設置報廢數量
    pub fn with_scrap_quantity(mut self, scrap: Decimal) -> Self {
        self.scrap_quantity = scrap;
        self
    }

    /// 建構器模式：設置延誤
    pub fn with_delay(mut self, minutes: u32, reason: Option<String>) -> Self {
        self.delay_minutes = minutes;
        self.delay_reason = reason;
        self
    }

    /// 建構器模式：部分確認
    pub fn as_partial(mut self) -> Self {
        self.save_as_partial = true;
        self
    }

    /// 建構器模式：設置備註
    pub fn with_notes(mut self, notes: String) -> Self {
        self.notes = Some(notes);
        self
    }
}

/// 駁回請求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectRequest {
    /// 報工內容（駁回同樣需要通過驗證閘門）
    pub submission: SubmitRequest,

    /// 駁回原因
    pub reason: String,

    /// 駁回人
    pub rejected_by: String,
}

/// 生產報工記錄
///
/// 只能透過狀態機變更狀態；沖銷後的記錄保留以供稽核，永不刪除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionConfirmation {
    pub id: Uuid,
    pub operation_id: String,
    pub product_id: String,
    pub target_quantity: Decimal,
    pub produced_quantity: Decimal,
    pub scrap_quantity: Decimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub equipment_ids: Vec<String>,
    pub operator_ids: Vec<String>,

    /// 實際耗用
    pub consumed_lines: Vec<AllocationLine>,

    /// 產出批次
    pub output_batches: Vec<OutputBatch>,

    pub delay: Option<DelayInfo>,
    pub status: ConfirmationStatus,

    /// 是否為部分確認
    pub partial: bool,

    /// 剩餘數量（部分確認時）
    pub remaining_quantity: Option<Decimal>,

    pub notes: Option<String>,
    pub submitted_by: String,
    pub created_at: DateTime<Utc>,
    pub rejection: Option<RejectionInfo>,
    pub reversal: Option<ReversalInfo>,
}

impl ProductionConfirmation {
    /// 依提交請求創建待審核記錄
    pub fn pending(
        context: &OperationContext,
        request: &SubmitRequest,
        created_at: DateTime<Utc>,
    ) -> Self {
        let delay = (request.delay_minutes > 0).then(|| DelayInfo {
            minutes: request.delay_minutes,
            reason: request.delay_reason.clone(),
        });

        Self {
            id: Uuid::new_v4(),
            operation_id: context.operation_id.clone(),
            product_id: context.product_id.clone(),
            target_quantity: context.target_quantity,
            produced_quantity: request.produced_quantity,
            scrap_quantity: request.scrap_quantity,
            start_time: request.start_time,
            end_time: request.end_time,
            equipment_ids: request.equipment_ids.clone(),
            operator_ids: request.operator_ids.clone(),
            consumed_lines: Vec::new(),
            output_batches: Vec::new(),
            delay,
            status: ConfirmationStatus::PendingReview,
            partial: false,
            remaining_quantity: None,
            notes: request.notes.clone(),
            submitted_by: request.submitted_by.clone(),
            created_at,
            rejection: None,
            reversal: None,
        }
    }

    /// 狀態轉換，非法轉換回傳 `InvalidTransition`
    pub fn transition(&mut self, next: ConfirmationStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(MesError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// 總耗用數量
    pub fn consumed_total(&self) -> Decimal {
        self.consumed_lines.iter().map(|l| l.quantity).sum()
    }

    /// 產出批號
    pub fn batch_numbers(&self) -> Vec<String> {
        self.output_batches
            .iter()
            .map(|b| b.batch_number.clone())
            .collect()
    }
}
