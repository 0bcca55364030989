//! 記憶體預留管理器
//!
//! 每個批次一個槽位鎖，另有持有者索引；鎖定順序固定為槽位 → 索引。
//! 槽位在釋放後若無其他引用即從表中移除。

use mes_core::{Clock, HolderId, Reservation, SystemClock};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::{ReservationConflict, ReservationManager};

type Slot = Arc<Mutex<Option<Reservation>>>;

/// 記憶體預留管理器
pub struct InMemoryReservationManager {
    clock: Arc<dyn Clock>,

    /// 批次ID → 槽位
    slots: RwLock<HashMap<String, Slot>>,

    /// 持有者 → 已預留批次
    index: Mutex<HashMap<HolderId, BTreeSet<String>>>,
}

impl Default for InMemoryReservationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryReservationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("InMemoryReservationManager")
            .field("slots", &slots)
            .finish()
    }
}

impl InMemoryReservationManager {
    /// 使用系統時鐘創建
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 使用指定時鐘創建
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: RwLock::new(HashMap::new()),
            index: Mutex::new(HashMap::new()),
        }
    }

    /// 目前預留總數
    pub fn len(&self) -> usize {
        self.slot_snapshot()
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn existing_slot(&self, lot_id: &str) -> Option<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(lot_id)
            .cloned()
    }

    fn slot(&self, lot_id: &str) -> Slot {
        if let Some(slot) = self.existing_slot(lot_id) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.entry(lot_id.to_string()).or_default().clone()
    }

    fn slot_snapshot(&self) -> Vec<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn index_insert(&self, holder: &HolderId, lot_id: &str) {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index
            .entry(holder.clone())
            .or_default()
            .insert(lot_id.to_string());
    }

    fn index_remove(&self, holder: &HolderId, lot_id: &str) {
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lots) = index.get_mut(holder) {
            lots.remove(lot_id);
            if lots.is_empty() {
                index.remove(holder);
            }
        }
    }

    fn lots_of(&self, holder: &HolderId) -> Vec<String> {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(holder)
            .map(|lots| lots.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 釋放單一批次，回傳是否確實釋放
    fn release_slot(&self, lot_id: &str, holder: &HolderId) -> bool {
        let Some(slot) = self.existing_slot(lot_id) else {
            return false;
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.as_ref().is_some_and(|r| r.is_held_by(holder)) {
            return false;
        }
        *guard = None;
        self.index_remove(holder, lot_id);
        drop(guard);
        drop(slot);

        self.prune_slot(lot_id);
        true
    }

    /// 移除空槽位（槽位只在表鎖內複製，引用數為 1 表示無人使用）
    fn prune_slot(&self, lot_id: &str) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.get(lot_id).is_some_and(is_unused) {
            slots.remove(lot_id);
        }
    }

    fn prune_empty_slots(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| !is_unused(slot));
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

fn is_unused(slot: &Slot) -> bool {
    Arc::strong_count(slot) == 1 && slot.lock().unwrap_or_else(PoisonError::into_inner).is_none()
}

impl ReservationManager for InMemoryReservationManager {
    fn reserve(
        &self,
        lot_id: &str,
        quantity: Decimal,
        holder: &HolderId,
    ) -> Result<Reservation, ReservationConflict> {
        let slot = self.slot(lot_id);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        match guard.as_mut() {
            Some(existing) if !existing.is_held_by(holder) => {
                tracing::warn!(
                    "預留衝突：批次 {} 已被 {} 預留，{} 請求失敗",
                    lot_id,
                    existing.holder,
                    holder
                );
                Err(ReservationConflict {
                    lot_id: lot_id.to_string(),
                    holder: existing.holder.clone(),
                })
            }
            Some(existing) => {
                existing.quantity = quantity;
                existing.last_activity_at = now;
                Ok(existing.clone())
            }
            None => {
                let reservation =
                    Reservation::new(lot_id.to_string(), holder.clone(), quantity, now);
                *guard = Some(reservation.clone());
                self.index_insert(holder, lot_id);
                tracing::debug!("批次 {} 由 {} 預留 {}", lot_id, holder, quantity);
                Ok(reservation)
            }
        }
    }

    fn release(&self, lot_id: &str, holder: &HolderId) {
        if self.release_slot(lot_id, holder) {
            tracing::debug!("批次 {} 由 {} 釋放", lot_id, holder);
        }
    }

    fn release_all(&self, holder: &HolderId) -> usize {
        let released = self
            .lots_of(holder)
            .iter()
            .filter(|lot_id| self.release_slot(lot_id, holder))
            .count();

        if released > 0 {
            tracing::info!("持有者 {} 釋放 {} 筆預留", holder, released);
        }
        released
    }

    fn holder_of(&self, lot_id: &str) -> Option<HolderId> {
        let slot = self.existing_slot(lot_id)?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|r| r.holder.clone())
    }

    fn reservations_of(&self, holder: &HolderId) -> Vec<Reservation> {
        self.lots_of(holder)
            .iter()
            .filter_map(|lot_id| {
                let slot = self.existing_slot(lot_id)?;
                let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                guard.as_ref().filter(|r| r.is_held_by(holder)).cloned()
            })
            .collect()
    }

    fn touch(&self, holder: &HolderId) {
        let now = self.clock.now();
        for lot_id in self.lots_of(holder) {
            if let Some(slot) = self.existing_slot(&lot_id) {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(reservation) = guard.as_mut().filter(|r| r.is_held_by(holder)) {
                    reservation.last_activity_at = now;
                }
            }
        }
    }

    fn release_idle(&self, idle: chrono::Duration) -> Vec<Reservation> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for slot in self.slot_snapshot() {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref().is_some_and(|r| r.is_idle(now, idle)) {
                if let Some(reservation) = guard.take() {
                    self.index_remove(&reservation.holder, &reservation.lot_id);
                    expired.push(reservation);
                }
            }
        }
        self.prune_empty_slots();

        if !expired.is_empty() {
            tracing::info!("閒置逾時釋放 {} 筆預留", expired.len());
        }
        expired.sort_by(|a, b| a.lot_id.cmp(&b.lot_id));
        expired
    }
}
