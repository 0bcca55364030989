//! # MES Confirm
//!
//! 生產報工服務：作業階段、外部協作介面與報工狀態機
//!
//! ## 流程
//!
//! 1. `begin_session` 讀取 BOM 與可用批次快照
//! 2. `propose` / `select_manual` / `add_line` 調整分配，同步預留
//! 3. `submit` 驗證後扣帳、拆批產出並保存記錄；或 `reject` 駁回
//! 4. 已確認記錄可經 `can_reverse` 檢查後 `reverse`

pub mod locks;
pub mod memory;
pub mod ports;
pub mod service;
pub mod session;

// Re-export 主要類型
pub use locks::KeyedLocks;
pub use memory::{
    InMemoryBatchNumbering, InMemoryConfirmationRepository, InMemoryLedger, InMemoryRecipes,
    InMemoryRoster,
};
pub use ports::{
    BatchNumbering, ConfirmationRepository, EquipmentRoster, InventoryLedger, OperatorRoster,
    RecipeProvider,
};
pub use service::{
    Collaborators, ConfirmationService, OperationProgress, ReversalEligibility, DEFAULT_OUTPUT_UNIT,
};
pub use session::{AllocationSession, SessionState};
