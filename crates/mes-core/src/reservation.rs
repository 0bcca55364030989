//! 預留模型

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 預留持有者（作業階段令牌）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(String);

impl HolderId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// 產生新的隨機令牌
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 批次預留（建議性，不改變帳上數量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// 批次ID
    pub lot_id: String,

    /// 持有者
    pub holder: HolderId,

    /// 預留數量
    pub quantity: Decimal,

    /// 建立時間
    pub created_at: DateTime<Utc>,

    /// 最後活動時間（閒置逾時依據）
    pub last_activity_at: DateTime<Utc>,
}

impl Reservation {
    /// 創建新的預留
    pub fn new(lot_id: String, holder: HolderId, quantity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            lot_id,
            holder,
            quantity,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// 是否屬於指定持有者
    pub fn is_held_by(&self, holder: &HolderId) -> bool {
        &self.holder == holder
    }

    /// 是否已閒置超過指定時間
    pub fn is_idle(&self, now: DateTime<Utc>, idle: chrono::Duration) -> bool {
        now - self.last_activity_at >= idle
    }
}
