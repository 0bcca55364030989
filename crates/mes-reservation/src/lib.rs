//! # MES Reservation
//!
//! 批次預留管理（建議性鎖定，不改變帳上數量）
//!
//! 預留只用來避免兩個作業階段同時選用同一批次；真正的數量檢查在提交時
//! 由庫存帳進行。需要強制鎖定時可替換 [`ReservationManager`] 的實作。

pub mod in_memory;

pub use in_memory::InMemoryReservationManager;

use mes_core::{HolderId, MesError, Reservation};
use rust_decimal::Decimal;

/// 預留衝突：批次已被其他持有者預留
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("批次 {lot_id} 已被 {holder} 預留")]
pub struct ReservationConflict {
    /// 批次ID
    pub lot_id: String,

    /// 目前持有者
    pub holder: HolderId,
}

impl From<ReservationConflict> for MesError {
    fn from(conflict: ReservationConflict) -> Self {
        MesError::Conflict {
            lot_id: conflict.lot_id,
            holder: conflict.holder,
        }
    }
}

/// 預留管理器
///
/// 同一批次最多一個持有者；同一持有者重複預留時更新數量。
pub trait ReservationManager: Send + Sync {
    /// 預留批次
    fn reserve(
        &self,
        lot_id: &str,
        quantity: Decimal,
        holder: &HolderId,
    ) -> Result<Reservation, ReservationConflict>;

    /// 釋放預留（非持有者或不存在時不做任何事）
    fn release(&self, lot_id: &str, holder: &HolderId);

    /// 釋放持有者的所有預留，回傳釋放數量
    fn release_all(&self, holder: &HolderId) -> usize;

    /// 查詢批次目前持有者
    fn holder_of(&self, lot_id: &str) -> Option<HolderId>;

    /// 查詢持有者的所有預留（依批次ID排序）
    fn reservations_of(&self, holder: &HolderId) -> Vec<Reservation>;

    /// 更新持有者的最後活動時間
    fn touch(&self, holder: &HolderId);

    /// 釋放閒置超過指定時間的預留
    fn release_idle(&self, idle: chrono::Duration) -> Vec<Reservation>;
}
