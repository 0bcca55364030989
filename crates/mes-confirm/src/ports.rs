//! 外部協作介面
//!
//! 庫存帳、BOM、批號、設備與操作員名冊、報工記錄儲存。
//! 服務只透過這些 trait 存取外部狀態，記憶體實作見 [`crate::memory`]。

use chrono::NaiveDate;
use mes_core::{InventoryLot, MaterialRequirement, OperationContext, ProductionConfirmation, Result};
use rust_decimal::Decimal;
use uuid::Uuid;

/// 庫存帳（數量與狀態的唯一真實來源）
pub trait InventoryLedger: Send + Sync {
    /// 列出可分配批次（AVAILABLE 或 RESERVED 且數量大於零），可依物料過濾
    fn list_available(&self, material_ids: Option<&[String]>) -> Result<Vec<InventoryLot>>;

    /// 查詢單一批次
    fn get_lot(&self, lot_id: &str) -> Result<InventoryLot>;

    /// 扣帳，數量歸零時批次轉為 CONSUMED
    ///
    /// 批次不可分配或數量不足時回傳 `InsufficientQuantity`，且不做任何變更。
    fn consume(&self, lot_id: &str, quantity: Decimal) -> Result<InventoryLot>;

    /// 回補（沖銷或提交失敗時使用），CONSUMED 批次回到 AVAILABLE
    fn restore(&self, lot_id: &str, quantity: Decimal) -> Result<InventoryLot>;

    /// 入帳新批次
    fn receive(&self, lot: InventoryLot) -> Result<()>;

    /// 將批次全部標記為 BLOCKED；任一批次不可失效時整批不變更
    fn invalidate(&self, lot_ids: &[String]) -> Result<()>;

    /// 撤銷 `invalidate`：BLOCKED 批次回到 AVAILABLE（僅供沖銷失敗時復原）
    ///
    /// 任一批次不是 BLOCKED 時整批不變更。
    fn reinstate(&self, lot_ids: &[String]) -> Result<()>;
}

/// BOM 來源
pub trait RecipeProvider: Send + Sync {
    /// 查詢作業對應的物料需求（無 BOM 時回傳空清單）
    fn requirements(&self, context: &OperationContext) -> Result<Vec<MaterialRequirement>>;
}

/// 批號服務
pub trait BatchNumbering: Send + Sync {
    /// 預覽下一個批號（不佔用流水號）
    fn preview_next_number(&self, context: &OperationContext, date: NaiveDate) -> Result<String>;

    /// 取得批號（佔用流水號）
    fn allocate_number(&self, context: &OperationContext, date: NaiveDate) -> Result<String>;
}

/// 設備名冊
pub trait EquipmentRoster: Send + Sync {
    fn available_equipment(&self) -> Vec<String>;
}

/// 操作員名冊
pub trait OperatorRoster: Send + Sync {
    fn active_operators(&self) -> Vec<String>;
}

/// 報工記錄儲存（記錄只新增與更新，不刪除）
pub trait ConfirmationRepository: Send + Sync {
    fn insert(&self, confirmation: ProductionConfirmation) -> Result<()>;

    fn update(&self, confirmation: &ProductionConfirmation) -> Result<()>;

    fn get(&self, id: Uuid) -> Result<ProductionConfirmation>;

    /// 依建立時間排序
    fn list_by_operation(&self, operation_id: &str) -> Result<Vec<ProductionConfirmation>>;
}
