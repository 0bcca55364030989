//! 引擎配置

use serde::{Deserialize, Serialize};

use crate::quantity::{DEFAULT_QUANTITY_SCALE, MAX_QUANTITY_SCALE};
use crate::{MesError, Result};

/// 報工規劃引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 數量最小解析度（小數位數）
    pub quantity_scale: u32,

    /// 預留閒置逾時（秒），逾時後由 `release_idle` 釋放
    pub reservation_idle_timeout_secs: u64,

    /// 必要物料零分配時是否阻擋提交
    ///
    /// - true: 視為驗證錯誤
    /// - false: 僅提出警告（預設）
    pub block_on_unallocated_mandatory: bool,

    /// 批號格式，支援 `{product}`、`{operation_type}`、`{date}`、`{seq}`
    pub batch_number_format: String,

    /// 批號流水號位數
    pub batch_sequence_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quantity_scale: DEFAULT_QUANTITY_SCALE,
            reservation_idle_timeout_secs: 15 * 60,
            block_on_unallocated_mandatory: false,
            batch_number_format: "{product}-{date}-{seq}".to_string(),
            batch_sequence_width: 3,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從 JSON 讀取配置，缺少的欄位使用預設值
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| MesError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 建構器模式：設置數量解析度
    pub fn with_quantity_scale(mut self, scale: u32) -> Self {
        self.quantity_scale = scale;
        self
    }

    /// 建構器模式：設置預留閒置逾時
    pub fn with_reservation_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.reservation_idle_timeout_secs = secs;
        self
    }

    /// 建構器模式：必要物料零分配時阻擋提交
    pub fn with_block_on_unallocated_mandatory(mut self, block: bool) -> Self {
        self.block_on_unallocated_mandatory = block;
        self
    }

    /// 建構器模式：設置批號格式
    pub fn with_batch_number_format(mut self, format: String) -> Self {
        self.batch_number_format = format;
        self
    }

    /// 預留閒置逾時
    pub fn reservation_idle_timeout(&self) -> chrono::Duration {
        let secs = self.reservation_idle_timeout_secs.min(u64::from(u32::MAX));
        chrono::Duration::seconds(secs as i64)
    }

    /// 檢查配置是否合法
    pub fn validate(&self) -> Result<()> {
        if self.quantity_scale > MAX_QUANTITY_SCALE {
            return Err(MesError::Config(format!(
                "數量解析度最多 {} 位小數，目前為 {}",
                MAX_QUANTITY_SCALE, self.quantity_scale
            )));
        }
        if !self.batch_number_format.contains("{seq}") {
            return Err(MesError::Config("批號格式必須包含 {seq}".to_string()));
        }
        Ok(())
    }
}
