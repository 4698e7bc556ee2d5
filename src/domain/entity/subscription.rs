use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::accounting::ResetPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "suspended" => Some(SubscriptionStatus::Suspended),
            "expired" => Some(SubscriptionStatus::Expired),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Subscription はシステムオブレコードから読み出すサブスクリプション。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: u64,
    pub user_id: u64,
    pub plan_id: u64,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Plan はトラフィック上限とリセット方式を持つ料金プラン。
///
/// reset_policy は保存値のまま保持し、解釈は `reset_policy()` で行う。
/// 未知の値を既定値に丸めないため。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: u64,
    pub name: String,
    pub plan_type: String,
    pub traffic_limit: u64,
    pub reset_policy: String,
}

impl Plan {
    /// トラフィック上限（バイト）。0 は無制限。
    pub fn traffic_limit(&self) -> u64 {
        self.traffic_limit
    }

    pub fn reset_policy(&self) -> Option<ResetPolicy> {
        ResetPolicy::from_str(&self.reset_policy)
    }
}
