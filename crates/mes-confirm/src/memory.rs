//! 協作介面的記憶體實作（測試、示範與單機部署）

use chrono::NaiveDate;
use mes_core::{
    EngineConfig, InventoryLot, LotAction, LotState, MaterialRequirement, MesError,
    OperationContext, ProductionConfirmation, Result,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use uuid::Uuid;

use crate::ports::{
    BatchNumbering, ConfirmationRepository, EquipmentRoster, InventoryLedger, OperatorRoster,
    RecipeProvider,
};

/// 記憶體庫存帳
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    lots: RwLock<HashMap<String, InventoryLot>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始批次創建
    pub fn with_lots(lots: Vec<InventoryLot>) -> Self {
        let lots = lots.into_iter().map(|l| (l.lot_id.clone(), l)).collect();
        Self {
            lots: RwLock::new(lots),
        }
    }

    /// 所有批次（依批次ID排序）
    pub fn snapshot(&self) -> Vec<InventoryLot> {
        let lots = self.lots.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = lots.values().cloned().collect();
        all.sort_by(|a, b| a.lot_id.cmp(&b.lot_id));
        all
    }
}

impl InventoryLedger for InMemoryLedger {
    fn list_available(&self, material_ids: Option<&[String]>) -> Result<Vec<InventoryLot>> {
        let lots = self.lots.read().unwrap_or_else(PoisonError::into_inner);
        let mut available: Vec<InventoryLot> = lots
            .values()
            .filter(|lot| lot.is_allocatable())
            .filter(|lot| material_ids.map_or(true, |ids| ids.contains(&lot.material_id)))
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.lot_id.cmp(&b.lot_id))
        });
        Ok(available)
    }

    fn get_lot(&self, lot_id: &str) -> Result<InventoryLot> {
        let lots = self.lots.read().unwrap_or_else(PoisonError::into_inner);
        lots.get(lot_id)
            .cloned()
            .ok_or_else(|| MesError::LotNotFound(lot_id.to_string()))
    }

    fn consume(&self, lot_id: &str, quantity: Decimal) -> Result<InventoryLot> {
        let mut lots = self.lots.write().unwrap_or_else(PoisonError::into_inner);
        let lot = lots
            .get_mut(lot_id)
            .ok_or_else(|| MesError::LotNotFound(lot_id.to_string()))?;

        let available = if lot.state.is_allocatable() {
            lot.quantity
        } else {
            Decimal::ZERO
        };
        if quantity <= Decimal::ZERO || quantity > available {
            return Err(MesError::InsufficientQuantity {
                lot_id: lot_id.to_string(),
                requested: quantity,
                available,
            });
        }

        lot.quantity -= quantity;
        if lot.quantity.is_zero() {
            lot.transition(LotState::Consumed);
        }
        Ok(lot.clone())
    }

    fn restore(&self, lot_id: &str, quantity: Decimal) -> Result<InventoryLot> {
        let mut lots = self.lots.write().unwrap_or_else(PoisonError::into_inner);
        let lot = lots
            .get_mut(lot_id)
            .ok_or_else(|| MesError::LotNotFound(lot_id.to_string()))?;

        match lot.state {
            // 回補是唯一允許 CONSUMED → AVAILABLE 的路徑
            LotState::Consumed => lot.state = LotState::Available,
            LotState::Available | LotState::Reserved => {}
            state => {
                return Err(MesError::InvalidLotState {
                    lot_id: lot_id.to_string(),
                    state,
                    action: LotAction::Restore,
                })
            }
        }
        lot.quantity += quantity;
        Ok(lot.clone())
    }

    fn receive(&self, lot: InventoryLot) -> Result<()> {
        let mut lots = self.lots.write().unwrap_or_else(PoisonError::into_inner);
        if lots.contains_key(&lot.lot_id) {
            return Err(MesError::DuplicateLot(lot.lot_id));
        }
        lots.insert(lot.lot_id.clone(), lot);
        Ok(())
    }

    fn invalidate(&self, lot_ids: &[String]) -> Result<()> {
        let mut lots = self.lots.write().unwrap_or_else(PoisonError::into_inner);
        check_states(&lots, lot_ids, LotAction::Invalidate, |state| {
            state.can_transition_to(LotState::Blocked)
        })?;

        for lot_id in lot_ids {
            if let Some(lot) = lots.get_mut(lot_id) {
                lot.transition(LotState::Blocked);
            }
        }
        Ok(())
    }

    fn reinstate(&self, lot_ids: &[String]) -> Result<()> {
        let mut lots = self.lots.write().unwrap_or_else(PoisonError::into_inner);
        check_states(&lots, lot_ids, LotAction::Reinstate, |state| {
            state == LotState::Blocked
        })?;

        for lot_id in lot_ids {
            if let Some(lot) = lots.get_mut(lot_id) {
                lot.state = LotState::Available;
            }
        }
        Ok(())
    }
}

/// 批次全部存在且狀態允許操作時才回傳 Ok
fn check_states(
    lots: &HashMap<String, InventoryLot>,
    lot_ids: &[String],
    action: LotAction,
    allowed: impl Fn(LotState) -> bool,
) -> Result<()> {
    for lot_id in lot_ids {
        let lot = lots
            .get(lot_id)
            .ok_or_else(|| MesError::LotNotFound(lot_id.clone()))?;
        if !allowed(lot.state) {
            return Err(MesError::InvalidLotState {
                lot_id: lot_id.clone(),
                state: lot.state,
                action,
            });
        }
    }
    Ok(())
}

/// 記憶體 BOM 來源，依（作業類型, 產品）索引
#[derive(Debug, Default)]
pub struct InMemoryRecipes {
    recipes: RwLock<HashMap<(String, String), Vec<MaterialRequirement>>>,
}

impl InMemoryRecipes {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：加入 BOM
    pub fn with_recipe(
        self,
        operation_type: &str,
        product_id: &str,
        requirements: Vec<MaterialRequirement>,
    ) -> Self {
        self.insert(operation_type, product_id, requirements);
        self
    }

    pub fn insert(
        &self,
        operation_type: &str,
        product_id: &str,
        requirements: Vec<MaterialRequirement>,
    ) {
        self.recipes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((operation_type.to_string(), product_id.to_string()), requirements);
    }
}

impl RecipeProvider for InMemoryRecipes {
    fn requirements(&self, context: &OperationContext) -> Result<Vec<MaterialRequirement>> {
        let recipes = self.recipes.read().unwrap_or_else(PoisonError::into_inner);
        let key = (context.operation_type.clone(), context.product_id.clone());
        let mut requirements = recipes.get(&key).cloned().unwrap_or_default();
        // 多階 BOM 依層級排列，同層維持原順序
        requirements.sort_by_key(|r| r.level);
        Ok(requirements)
    }
}

/// 依格式產生批號，流水號依（格式前綴）分別累計
#[derive(Debug)]
pub struct InMemoryBatchNumbering {
    format: String,
    width: usize,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryBatchNumbering {
    pub fn new(format: String, width: usize) -> Self {
        Self {
            format,
            width,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.batch_number_format.clone(),
            config.batch_sequence_width,
        )
    }

    /// 填入產品、作業類型與日期，保留 `{seq}`
    fn series(&self, context: &OperationContext, date: NaiveDate) -> String {
        self.format
            .replace("{product}", &context.product_id)
            .replace("{operation_type}", &context.operation_type)
            .replace("{date}", &date.format("%Y%m%d").to_string())
    }

    fn render(&self, series: &str, sequence: u64) -> String {
        series.replace("{seq}", &format!("{:0width$}", sequence, width = self.width))
    }
}

impl BatchNumbering for InMemoryBatchNumbering {
    fn preview_next_number(&self, context: &OperationContext, date: NaiveDate) -> Result<String> {
        let series = self.series(context, date);
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let next = counters.get(&series).copied().unwrap_or(0) + 1;
        Ok(self.render(&series, next))
    }

    fn allocate_number(&self, context: &OperationContext, date: NaiveDate) -> Result<String> {
        let series = self.series(context, date);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(series.clone()).or_insert(0);
        *counter += 1;
        Ok(self.render(&series, *counter))
    }
}

/// 記憶體名冊（設備或操作員）
#[derive(Debug, Default)]
pub struct InMemoryRoster {
    active: RwLock<Vec<String>>,
}

impl InMemoryRoster {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            active: RwLock::new(ids),
        }
    }

    /// 停用（設備維修、操作員離班）
    pub fn deactivate(&self, id: &str) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a != id);
    }

    fn list(&self) -> Vec<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EquipmentRoster for InMemoryRoster {
    fn available_equipment(&self) -> Vec<String> {
        self.list()
    }
}

impl OperatorRoster for InMemoryRoster {
    fn active_operators(&self) -> Vec<String> {
        self.list()
    }
}

/// 記憶體報工記錄
#[derive(Debug, Default)]
pub struct InMemoryConfirmationRepository {
    records: RwLock<HashMap<Uuid, ProductionConfirmation>>,
}

impl InMemoryConfirmationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfirmationRepository for InMemoryConfirmationRepository {
    fn insert(&self, confirmation: ProductionConfirmation) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&confirmation.id) {
            return Err(MesError::DuplicateConfirmation(confirmation.id));
        }
        records.insert(confirmation.id, confirmation);
        Ok(())
    }

    fn update(&self, confirmation: &ProductionConfirmation) -> Result<()> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let slot = records
            .get_mut(&confirmation.id)
            .ok_or(MesError::ConfirmationNotFound(confirmation.id))?;
        *slot = confirmation.clone();
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<ProductionConfirmation> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records
            .get(&id)
            .cloned()
            .ok_or(MesError::ConfirmationNotFound(id))
    }

    fn list_by_operation(&self, operation_id: &str) -> Result<Vec<ProductionConfirmation>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut matching: Vec<_> = records
            .values()
            .filter(|r| r.operation_id == operation_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matching)
    }
}
