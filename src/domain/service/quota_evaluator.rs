use crate::domain::entity::{QuotaCheck, UsageResult};

/// 使用量をプラン上限と比較する。
///
/// - limit == 0 は無制限を表し、使用量に関わらず超過しない（remaining は 0）。
/// - total == limit は超過として扱う。
pub fn evaluate_quota(usage: &UsageResult, limit: u64) -> QuotaCheck {
    if limit == 0 {
        return QuotaCheck {
            exceeded: false,
            total_used: usage.total,
            limit,
            remaining_bytes: 0,
            usage_percent: 0.0,
            unlimited: true,
        };
    }

    let exceeded = usage.total >= limit;
    let remaining_bytes = if exceeded { 0 } else { limit - usage.total };
    let usage_percent = (usage.total as f64 / limit as f64) * 100.0;

    QuotaCheck {
        exceeded,
        total_used: usage.total,
        limit,
        remaining_bytes,
        usage_percent,
        unlimited: false,
    }
}
