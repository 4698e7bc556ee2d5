use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// QuotaCheck はクォータ判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub exceeded: bool,
    pub total_used: u64,
    pub limit: u64,
    pub remaining_bytes: u64,
    pub usage_percent: f64,
    /// limit == 0（無制限）の場合 true。この場合 remaining_bytes は 0 で意味を持たない。
    pub unlimited: bool,
}

impl QuotaCheck {
    /// 表示系でも判定系と同じ「上限到達 = 超過」の規則を使う。
    pub fn is_exhausted(&self) -> bool {
        !self.unlimited && self.total_used >= self.limit
    }
}

/// CachedQuota は高速ストアに保持するサブスクリプション毎のクォータスナップショット。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedQuota {
    pub subscription_id: u64,
    pub limit: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub plan_type: String,
    pub suspended: bool,
}
