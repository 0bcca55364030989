//! # MES
//!
//! 生產報工物料規劃引擎
//!
//! - [`domain`]: 資料模型、狀態機、錯誤與配置
//! - [`calc`]: 耗用分配、拆批規劃與驗證閘門
//! - [`reservation`]: 批次預留管理
//! - [`confirm`]: 作業階段與報工服務

pub use mes_calc as calc;
pub use mes_confirm as confirm;
pub use mes_core as domain;
pub use mes_reservation as reservation;

pub use mes_calc::{
    AllocationEngine, AllocationProposal, BatchSizePlanner, ManualSelection, PlanWarning,
    SplitStrategy, WarningKind, WarningSeverity,
};
pub use mes_confirm::{
    AllocationSession, Collaborators, ConfirmationService, OperationProgress,
    ReversalEligibility, SessionState,
};
pub use mes_core::{
    ConfirmationStatus, EngineConfig, HolderId, InventoryLot, LotState, MaterialRequirement,
    MesError, OperationContext, ProductionConfirmation, RejectRequest, Result, SubmitRequest,
};
pub use mes_reservation::{InMemoryReservationManager, ReservationConflict, ReservationManager};

pub mod telemetry {
    //! 日誌初始化

    use tracing_subscriber::EnvFilter;

    /// 初始化 tracing（`RUST_LOG` 未設定時預設 `info`）
    ///
    /// 可重複呼叫，之後的呼叫不做任何事。
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}
