//! 報工服務
//!
//! 協調庫存帳、分配引擎、預留管理、拆批規劃與批號服務，
//! 並依狀態機管理報工記錄（確認、部分確認、駁回、沖銷）。

use chrono::{DateTime, Utc};
use mes_calc::{
    AllocationEngine, BatchSizePlanner, ConfirmationValidator, ManualSelection, PlanWarning,
    SplitPreview, SplitStrategy, ValidationContext, WarningKind,
};
use mes_core::quantity::round_qty;
use mes_core::{
    AllocationLine, BatchSizeConfig, Clock, ConfirmationStatus, EngineConfig, HolderId,
    InventoryLot, LotState, MesError, OperationContext, OutputBatch, ProductionConfirmation,
    RejectRequest, RejectionInfo, Reservation, Result, ReversalInfo, SubmitRequest, SystemClock,
};
use mes_reservation::ReservationManager;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use uuid::Uuid;

use crate::locks::KeyedLocks;
use crate::ports::{
    BatchNumbering, ConfirmationRepository, EquipmentRoster, InventoryLedger, OperatorRoster,
    RecipeProvider,
};
use crate::session::{AllocationSession, SessionState};

/// 無批量配置時產出批次的單位
pub const DEFAULT_OUTPUT_UNIT: &str = "EA";

/// 服務依賴的外部協作者
#[derive(Clone)]
pub struct Collaborators {
    pub ledger: Arc<dyn InventoryLedger>,
    pub recipes: Arc<dyn RecipeProvider>,
    pub numbering: Arc<dyn BatchNumbering>,
    pub equipment: Arc<dyn EquipmentRoster>,
    pub operators: Arc<dyn OperatorRoster>,
    pub repository: Arc<dyn ConfirmationRepository>,
    pub reservations: Arc<dyn ReservationManager>,
}

/// 作業進度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub operation_id: String,

    /// 作業目標產量
    pub target_quantity: Decimal,

    /// 已確認產量（含部分確認，不含沖銷）
    pub produced_quantity: Decimal,
}

impl OperationProgress {
    pub fn new(operation_id: String, target_quantity: Decimal) -> Self {
        Self {
            operation_id,
            target_quantity,
            produced_quantity: Decimal::ZERO,
        }
    }

    /// 剩餘可報工數量
    pub fn remaining_quantity(&self) -> Decimal {
        (self.target_quantity - self.produced_quantity).max(Decimal::ZERO)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining_quantity().is_zero()
    }
}

/// 沖銷資格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalEligibility {
    pub eligible: bool,

    /// 不可沖銷的原因
    pub reason: Option<String>,
}

impl ReversalEligibility {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    pub fn ineligible(reason: String) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// 報工服務
pub struct ConfirmationService {
    config: EngineConfig,
    clock: Arc<dyn Clock>,

    ledger: Arc<dyn InventoryLedger>,
    recipes: Arc<dyn RecipeProvider>,
    numbering: Arc<dyn BatchNumbering>,
    equipment: Arc<dyn EquipmentRoster>,
    operators: Arc<dyn OperatorRoster>,
    repository: Arc<dyn ConfirmationRepository>,
    reservations: Arc<dyn ReservationManager>,

    engine: AllocationEngine,
    planner: RwLock<BatchSizePlanner>,
    validator: ConfirmationValidator,
    split_strategy: SplitStrategy,

    /// 作業ID → 進度
    progress: Mutex<HashMap<String, OperationProgress>>,

    /// 同作業的提交與沖銷依序執行
    operation_locks: KeyedLocks,

    /// 同報工記錄的沖銷依序執行
    confirmation_locks: KeyedLocks,
}

impl ConfirmationService {
    /// 創建新的報工服務
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        batch_configs: Vec<BatchSizeConfig>,
    ) -> Self {
        let Collaborators {
            ledger,
            recipes,
            numbering,
            equipment,
            operators,
            repository,
            reservations,
        } = collaborators;

        Self {
            engine: AllocationEngine::from_config(&config),
            planner: RwLock::new(BatchSizePlanner::from_config(batch_configs, &config)),
            validator: ConfirmationValidator::from_config(&config),
            split_strategy: SplitStrategy::default(),
            clock: Arc::new(SystemClock),
            config,
            ledger,
            recipes,
            numbering,
            equipment,
            operators,
            repository,
            reservations,
            progress: Mutex::new(HashMap::new()),
            operation_locks: KeyedLocks::new(),
            confirmation_locks: KeyedLocks::new(),
        }
    }

    /// 建構器模式：設置時鐘
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 建構器模式：設置拆批策略
    pub fn with_split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.split_strategy = strategy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 新增或取代批量配置
    pub fn upsert_batch_config(&self, config: BatchSizeConfig) {
        self.planner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert_config(config);
    }

    // ------------------------------------------------------------------
    // 作業階段
    // ------------------------------------------------------------------

    /// 開始作業階段
    ///
    /// 首次開始的作業會登記目標產量；階段目標為作業目前的剩餘數量。
    pub fn begin_session(
        &self,
        context: OperationContext,
        holder: HolderId,
    ) -> Result<AllocationSession> {
        let target = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            progress
                .entry(context.operation_id.clone())
                .or_insert_with(|| {
                    OperationProgress::new(context.operation_id.clone(), context.target_quantity)
                })
                .remaining_quantity()
        };

        let requirements = self.recipes.requirements(&context)?;
        let mut session = AllocationSession::new(
            holder,
            context,
            target,
            requirements,
            Vec::new(),
            self.clock.now(),
        );
        session.lots = self.ledger.list_available(Some(&session.material_ids()))?;

        tracing::info!(
            "開始報工階段: 作業 {} 持有者 {} 剩餘 {}，物料需求 {} 筆，候選批次 {} 筆",
            session.context.operation_id,
            session.holder,
            target,
            session.requirements.len(),
            session.lots.len()
        );

        Ok(session)
    }

    /// 依階段計劃產量建議分配並預留
    pub fn propose(&self, session: &mut AllocationSession) -> Result<()> {
        Self::ensure_open(session)?;

        session.proposal = self.engine.propose(
            &session.requirements,
            session.planned_quantity,
            &session.lots,
        );
        session.manual = false;
        self.sync_reservations(session);

        Ok(())
    }

    /// 以指定產量重新建議分配（例如部分報工）
    pub fn propose_for(&self, session: &mut AllocationSession, quantity: Decimal) -> Result<()> {
        Self::ensure_open(session)?;

        session.planned_quantity =
            round_qty(quantity.max(Decimal::ZERO), self.config.quantity_scale);
        self.propose(session)
    }

    /// 以手動選取取代目前分配
    pub fn select_manual(
        &self,
        session: &mut AllocationSession,
        selections: &[ManualSelection],
    ) -> Result<()> {
        self.apply_selections(session, selections)?;
        session.manual = true;
        Ok(())
    }

    /// 新增或調整單一批次的耗用數量
    pub fn add_line(
        &self,
        session: &mut AllocationSession,
        lot_id: &str,
        quantity: Decimal,
    ) -> Result<()> {
        let mut selections: Vec<ManualSelection> = Self::current_selections(session)
            .into_iter()
            .filter(|s| s.lot_id != lot_id)
            .collect();
        selections.push(ManualSelection::new(lot_id.to_string(), quantity));

        self.select_manual(session, &selections)
    }

    /// 移除單一批次
    pub fn remove_line(&self, session: &mut AllocationSession, lot_id: &str) -> Result<()> {
        let selections: Vec<ManualSelection> = Self::current_selections(session)
            .into_iter()
            .filter(|s| s.lot_id != lot_id)
            .collect();

        self.select_manual(session, &selections)
    }

    /// 重新讀取可用批次，目前的分配依新數量截斷
    pub fn refresh_snapshot(&self, session: &mut AllocationSession) -> Result<()> {
        Self::ensure_open(session)?;

        session.lots = self.ledger.list_available(Some(&session.material_ids()))?;
        tracing::debug!(
            "重新讀取批次快照: 持有者 {} 候選批次 {} 筆",
            session.holder,
            session.lots.len()
        );

        if session.proposal.materials.is_empty() {
            self.reservations.touch(&session.holder);
            return Ok(());
        }

        let selections = Self::current_selections(session);
        self.apply_selections(session, &selections)
    }

    /// 取消階段並釋放所有預留
    pub fn cancel(&self, session: &mut AllocationSession) -> usize {
        let released = self.reservations.release_all(&session.holder);
        session.reserved_lots.clear();
        session.conflicts.clear();
        if session.is_open() {
            session.state = SessionState::Cancelled;
            tracing::info!(
                "取消報工階段: 作業 {} 持有者 {}，釋放 {} 筆預留",
                session.context.operation_id,
                session.holder,
                released
            );
        }
        released
    }

    // ------------------------------------------------------------------
    // 預覽
    // ------------------------------------------------------------------

    /// 批量檢查與拆批預覽
    pub fn preview_split(&self, context: &OperationContext, quantity: Decimal) -> SplitPreview {
        self.planner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .preview(
                &context.operation_type,
                &context.product_id,
                quantity,
                self.split_strategy,
            )
    }

    /// 預覽下一個產出批號
    pub fn preview_batch_number(&self, context: &OperationContext) -> Result<String> {
        self.numbering
            .preview_next_number(context, self.clock.now().date_naive())
    }

    // ------------------------------------------------------------------
    // 狀態轉換
    // ------------------------------------------------------------------

    /// 提交報工
    ///
    /// 自動分配先依實際產量重新計算；驗證通過後扣帳、產生產出批次並保存記錄。
    /// 任一步驟失敗時已扣帳的批次回補，已產生的產出批次凍結，不留下部分結果。
    pub fn submit(
        &self,
        session: &mut AllocationSession,
        request: &SubmitRequest,
    ) -> Result<ProductionConfirmation> {
        Self::ensure_open(session)?;
        let excess = self.align_to_produced(session, request.produced_quantity)?;

        let now = self.clock.now();
        let equipment = self.equipment.available_equipment();
        let operators = self.operators.active_operators();

        let operation_id = session.context.operation_id.clone();
        let (record, warnings) = self.operation_locks.run(&operation_id, || {
            self.commit(session, request, now, &equipment, &operators)
        })?;

        self.reservations.release_all(&session.holder);
        session.reserved_lots.clear();
        session.conflicts.clear();
        session.state = SessionState::Submitted;

        for warning in excess.iter().chain(&warnings) {
            tracing::warn!("報工 {}: {}", record.id, warning.message);
        }
        tracing::info!(
            "報工 {} {}: 作業 {} 產出 {}，耗用 {} 批，產出批次 {:?}，警告 {} 筆",
            record.id,
            record.status,
            record.operation_id,
            record.produced_quantity,
            record.consumed_lines.len(),
            record.batch_numbers(),
            excess.len() + warnings.len()
        );

        Ok(record)
    }

    /// 檢查分配是否超過實際產量所需（手動選取時提交會照選取耗用）
    pub fn check_consumption(
        &self,
        session: &AllocationSession,
        produced: Decimal,
    ) -> Vec<PlanWarning> {
        let scale = self.config.quantity_scale;
        let produced = round_qty(produced, scale);

        let mut needed: BTreeMap<&str, Decimal> = BTreeMap::new();
        for requirement in &session.requirements {
            *needed
                .entry(requirement.material_id.as_str())
                .or_insert(Decimal::ZERO) += requirement.needed_for(produced, scale);
        }

        needed
            .into_iter()
            .filter_map(|(material_id, needed)| {
                let allocated = session.proposal.total_for(material_id);
                (allocated > needed).then(|| {
                    PlanWarning::warning(
                        material_id.to_string(),
                        WarningKind::ExcessConsumption,
                        format!(
                            "物料 {} 耗用 {} 超過產量 {} 所需 {}",
                            material_id, allocated, produced, needed
                        ),
                    )
                })
            })
            .collect()
    }

    /// 駁回報工（不扣帳，釋放預留）
    pub fn reject(
        &self,
        session: &mut AllocationSession,
        request: &RejectRequest,
    ) -> Result<ProductionConfirmation> {
        Self::ensure_open(session)?;

        let now = self.clock.now();
        let equipment = self.equipment.available_equipment();
        let operators = self.operators.active_operators();
        let remaining = self.remaining_quantity(&session.context.operation_id);

        let validation =
            ValidationContext::new(now, remaining).with_rosters(&equipment, &operators);
        self.validator
            .validate_rejection(request, &validation)
            .into_result()?;

        let mut record = ProductionConfirmation::pending(&session.context, &request.submission, now);
        record.target_quantity = remaining;
        record.transition(ConfirmationStatus::Rejected)?;
        record.rejection = Some(RejectionInfo {
            reason: request.reason.clone(),
            rejected_by: request.rejected_by.clone(),
            rejected_at: now,
        });
        self.repository.insert(record.clone())?;

        let released = self.reservations.release_all(&session.holder);
        session.reserved_lots.clear();
        session.conflicts.clear();
        session.state = SessionState::Rejected;

        tracing::info!(
            "報工 {} 已駁回: 作業 {} 原因 {}，釋放 {} 筆預留",
            record.id,
            record.operation_id,
            request.reason,
            released
        );

        Ok(record)
    }

    /// 檢查報工是否可沖銷
    pub fn can_reverse(&self, confirmation_id: Uuid) -> Result<ReversalEligibility> {
        let record = self.repository.get(confirmation_id)?;
        Ok(self.check_reversal(&record))
    }

    /// 沖銷報工：回補耗用批次、凍結產出批次、扣回作業進度
    ///
    /// 任一步驟失敗時已回補的批次重新扣帳、產出批次解除凍結，記錄維持原狀。
    pub fn reverse(
        &self,
        confirmation_id: Uuid,
        reason: &str,
        notes: Option<String>,
        reversed_by: &str,
    ) -> Result<ProductionConfirmation> {
        self.confirmation_locks.run(&confirmation_id.to_string(), || {
            let record = self.repository.get(confirmation_id)?;
            let operation_id = record.operation_id.clone();
            self.operation_locks.run(&operation_id, || {
                self.reverse_locked(record, reason, notes, reversed_by)
            })
        })
    }

    /// 釋放閒置逾時的預留
    pub fn expire_idle_reservations(&self) -> Vec<Reservation> {
        self.reservations
            .release_idle(self.config.reservation_idle_timeout())
    }

    // ------------------------------------------------------------------
    // 查詢
    // ------------------------------------------------------------------

    pub fn confirmation(&self, confirmation_id: Uuid) -> Result<ProductionConfirmation> {
        self.repository.get(confirmation_id)
    }

    pub fn confirmations_for_operation(
        &self,
        operation_id: &str,
    ) -> Result<Vec<ProductionConfirmation>> {
        self.repository.list_by_operation(operation_id)
    }

    pub fn operation_progress(&self, operation_id: &str) -> Option<OperationProgress> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_id)
            .cloned()
    }

    pub fn available_equipment(&self) -> Vec<String> {
        self.equipment.available_equipment()
    }

    pub fn active_operators(&self) -> Vec<String> {
        self.operators.active_operators()
    }

    // ------------------------------------------------------------------
    // 內部
    // ------------------------------------------------------------------

    fn ensure_open(session: &AllocationSession) -> Result<()> {
        if session.is_open() {
            Ok(())
        } else {
            Err(MesError::SessionClosed(session.holder.to_string()))
        }
    }

    fn apply_selections(
        &self,
        session: &mut AllocationSession,
        selections: &[ManualSelection],
    ) -> Result<()> {
        Self::ensure_open(session)?;

        session.proposal = self.engine.apply_manual(
            &session.requirements,
            session.planned_quantity,
            selections,
            &session.lots,
        );
        self.sync_reservations(session);

        Ok(())
    }

    /// 自動分配依實際產量重新計算；手動選取保留並回傳超量警告
    fn align_to_produced(
        &self,
        session: &mut AllocationSession,
        produced: Decimal,
    ) -> Result<Vec<PlanWarning>> {
        let produced = round_qty(produced, self.config.quantity_scale);
        if produced <= Decimal::ZERO || session.proposal.materials.is_empty() {
            return Ok(Vec::new());
        }

        if session.manual {
            return Ok(self.check_consumption(session, produced));
        }

        if produced != session.planned_quantity {
            tracing::info!(
                "依實際產量重新分配: 持有者 {} 計劃 {} → 產出 {}",
                session.holder,
                session.planned_quantity,
                produced
            );
            self.propose_for(session, produced)?;
        }
        Ok(Vec::new())
    }

    /// 在作業鎖內驗證、扣帳、入帳並保存記錄
    fn commit(
        &self,
        session: &AllocationSession,
        request: &SubmitRequest,
        now: DateTime<Utc>,
        equipment: &[String],
        operators: &[String],
    ) -> Result<(ProductionConfirmation, Vec<PlanWarning>)> {
        let remaining = self.remaining_quantity(&session.context.operation_id);
        let validation = ValidationContext::new(now, remaining)
            .with_rosters(equipment, operators)
            .with_materials(session.materials());
        let warnings = self
            .validator
            .validate_submission(request, &validation)
            .into_result()?;

        let consumed = self.consume_lines(session.lines())?;
        let outputs = match self.receive_outputs(&session.context, request.produced_quantity, now)
        {
            Ok(outputs) => outputs,
            Err(e) => {
                self.rollback_consumption(&consumed);
                return Err(e);
            }
        };

        let mut record = ProductionConfirmation::pending(&session.context, request, now);
        record.target_quantity = remaining;
        record.consumed_lines = consumed;
        record.output_batches = outputs;

        if request.save_as_partial && request.produced_quantity < remaining {
            record.transition(ConfirmationStatus::PartiallyConfirmed)?;
            record.partial = true;
            record.remaining_quantity = Some(remaining - request.produced_quantity);
        } else {
            record.transition(ConfirmationStatus::Confirmed)?;
        }

        if let Err(e) = self.repository.insert(record.clone()) {
            self.rollback_consumption(&record.consumed_lines);
            self.discard_outputs(&record.output_batches);
            return Err(e);
        }

        self.adjust_progress(&record.operation_id, record.produced_quantity);
        Ok((record, warnings))
    }

    /// 在報工鎖與作業鎖內執行沖銷
    fn reverse_locked(
        &self,
        record: ProductionConfirmation,
        reason: &str,
        notes: Option<String>,
        reversed_by: &str,
    ) -> Result<ProductionConfirmation> {
        let eligibility = self.check_reversal(&record);
        if !eligibility.eligible {
            let reason = eligibility.reason.unwrap_or_default();
            tracing::warn!("報工 {} 不可沖銷: {}", record.id, reason);
            return Err(MesError::IneligibleReversal {
                confirmation_id: record.id,
                reason,
            });
        }

        let mut reversed = record.clone();
        reversed.transition(ConfirmationStatus::Reversed)?;
        reversed.reversal = Some(ReversalInfo {
            reason: reason.to_string(),
            notes,
            reversed_by: reversed_by.to_string(),
            reversed_at: self.clock.now(),
        });

        let outputs = record.batch_numbers();
        self.ledger.invalidate(&outputs)?;

        let mut restored: Vec<AllocationLine> = Vec::with_capacity(record.consumed_lines.len());
        for line in &record.consumed_lines {
            if let Err(e) = self.ledger.restore(&line.lot_id, line.quantity) {
                tracing::warn!(
                    "報工 {} 沖銷失敗: 批次 {} 回補失敗 {}，復原已回補 {} 筆",
                    record.id,
                    line.lot_id,
                    e,
                    restored.len()
                );
                self.undo_reversal(&restored, &outputs);
                return Err(e);
            }
            restored.push(line.clone());
        }

        if let Err(e) = self.repository.update(&reversed) {
            tracing::warn!("報工 {} 沖銷失敗: 記錄更新失敗 {}", record.id, e);
            self.undo_reversal(&restored, &outputs);
            return Err(e);
        }
        self.adjust_progress(&reversed.operation_id, -reversed.produced_quantity);

        tracing::info!(
            "報工 {} 已沖銷: 回補 {} 批，凍結產出批次 {:?}",
            reversed.id,
            restored.len(),
            outputs
        );

        Ok(reversed)
    }

    /// 已回補的批次重新扣帳，產出批次解除凍結
    fn undo_reversal(&self, restored: &[AllocationLine], outputs: &[String]) {
        for line in restored.iter().rev() {
            if let Err(e) = self.ledger.consume(&line.lot_id, line.quantity) {
                tracing::error!("批次 {} 重新扣帳 {} 失敗: {}", line.lot_id, line.quantity, e);
            }
        }
        if let Err(e) = self.ledger.reinstate(outputs) {
            tracing::error!("產出批次 {:?} 解除凍結失敗: {}", outputs, e);
        }
    }

    fn current_selections(session: &AllocationSession) -> Vec<ManualSelection> {
        session
            .line_quantities()
            .into_iter()
            .map(|(lot_id, quantity)| ManualSelection::new(lot_id, quantity))
            .collect()
    }

    fn remaining_quantity(&self, operation_id: &str) -> Decimal {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation_id)
            .map(OperationProgress::remaining_quantity)
            .unwrap_or(Decimal::ZERO)
    }

    fn adjust_progress(&self, operation_id: &str, delta: Decimal) {
        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = progress.get_mut(operation_id) {
            entry.produced_quantity = (entry.produced_quantity + delta).max(Decimal::ZERO);
        }
    }

    /// 讓預留與分配行一致；衝突記為警告，不移除分配行
    fn sync_reservations(&self, session: &mut AllocationSession) {
        let desired = session.line_quantities();

        let stale: Vec<String> = session
            .reserved_lots
            .iter()
            .filter(|lot_id| !desired.contains_key(*lot_id))
            .cloned()
            .collect();
        for lot_id in stale {
            self.reservations.release(&lot_id, &session.holder);
            session.reserved_lots.remove(&lot_id);
        }

        session.conflicts.clear();
        for (lot_id, quantity) in desired {
            match self.reservations.reserve(&lot_id, quantity, &session.holder) {
                Ok(_) => {
                    session.reserved_lots.insert(lot_id);
                }
                Err(conflict) => {
                    session.reserved_lots.remove(&lot_id);
                    let warning = PlanWarning::warning(
                        lot_id.clone(),
                        WarningKind::ReservationConflict,
                        format!("批次 {} 正由 {} 使用中", lot_id, conflict.holder),
                    );
                    session.conflicts.insert(lot_id, warning);
                }
            }
        }

        self.reservations.touch(&session.holder);
        session.last_activity_at = self.clock.now();
    }

    /// 依序扣帳，失敗時回補已扣帳的批次
    fn consume_lines(&self, lines: &[AllocationLine]) -> Result<Vec<AllocationLine>> {
        let mut applied: Vec<AllocationLine> = Vec::with_capacity(lines.len());

        for line in lines.iter().filter(|l| !l.is_empty()) {
            if let Err(e) = self.ledger.consume(&line.lot_id, line.quantity) {
                tracing::warn!(
                    "批次 {} 扣帳失敗: {}，回補已扣帳 {} 筆",
                    line.lot_id,
                    e,
                    applied.len()
                );
                self.rollback_consumption(&applied);
                return Err(e);
            }
            applied.push(line.clone());
        }

        Ok(applied)
    }

    fn rollback_consumption(&self, lines: &[AllocationLine]) {
        for line in lines.iter().rev() {
            if let Err(e) = self.ledger.restore(&line.lot_id, line.quantity) {
                tracing::error!("批次 {} 回補 {} 失敗: {}", line.lot_id, line.quantity, e);
            }
        }
    }

    /// 依拆批計劃產生產出批次並入帳
    fn receive_outputs(
        &self,
        context: &OperationContext,
        produced: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Vec<OutputBatch>> {
        let preview = self.preview_split(context, produced);
        for warning in &preview.warnings {
            tracing::warn!("{}", warning.message);
        }

        let unit = preview
            .config
            .as_ref()
            .map(|c| c.unit.clone())
            .unwrap_or_else(|| DEFAULT_OUTPUT_UNIT.to_string());
        let quantities = preview
            .plan
            .map(|plan| plan.batches)
            .unwrap_or_else(|| vec![produced]);
        let date = now.date_naive();

        let mut outputs: Vec<OutputBatch> = Vec::with_capacity(quantities.len());
        for quantity in quantities {
            let received = self.numbering.allocate_number(context, date).and_then(|number| {
                let lot = InventoryLot::new(
                    number.clone(),
                    context.product_id.clone(),
                    quantity,
                    unit.clone(),
                    now,
                );
                self.ledger.receive(lot)?;
                Ok(number)
            });

            match received {
                Ok(batch_number) => outputs.push(OutputBatch {
                    batch_number,
                    quantity,
                }),
                Err(e) => {
                    self.discard_outputs(&outputs);
                    return Err(e);
                }
            }
        }

        Ok(outputs)
    }

    fn discard_outputs(&self, outputs: &[OutputBatch]) {
        if outputs.is_empty() {
            return;
        }
        let lot_ids: Vec<String> = outputs.iter().map(|o| o.batch_number.clone()).collect();
        if let Err(e) = self.ledger.invalidate(&lot_ids) {
            tracing::error!("產出批次 {:?} 凍結失敗: {}", lot_ids, e);
        }
    }

    fn check_reversal(&self, record: &ProductionConfirmation) -> ReversalEligibility {
        if !record.status.is_reversible() {
            return ReversalEligibility::ineligible(format!("狀態 {} 不可沖銷", record.status));
        }

        for batch in &record.output_batches {
            match self.ledger.get_lot(&batch.batch_number) {
                Ok(lot) if lot.state.is_allocatable() && lot.quantity >= batch.quantity => {}
                Ok(lot) if matches!(lot.state, LotState::Blocked | LotState::Scrapped) => {
                    return ReversalEligibility::ineligible(format!(
                        "產出批次 {} 已失效（{}）",
                        batch.batch_number, lot.state
                    ));
                }
                Ok(_) => {
                    return ReversalEligibility::ineligible(format!(
                        "產出批次 {} 已被後續作業耗用",
                        batch.batch_number
                    ));
                }
                Err(_) => {
                    return ReversalEligibility::ineligible(format!(
                        "找不到產出批次 {}",
                        batch.batch_number
                    ));
                }
            }
        }

        for line in &record.consumed_lines {
            match self.ledger.get_lot(&line.lot_id) {
                Ok(lot) if matches!(lot.state, LotState::Blocked | LotState::Scrapped) => {
                    return ReversalEligibility::ineligible(format!(
                        "耗用批次 {} 已{}，無法回補",
                        line.lot_id, lot.state
                    ));
                }
                Ok(_) => {}
                Err(_) => {
                    return ReversalEligibility::ineligible(format!(
                        "找不到耗用批次 {}",
                        line.lot_id
                    ));
                }
            }
        }

        ReversalEligibility::eligible()
    }
}
