use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ResetPolicy はプランの集計期間リセット方式を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    /// 業務タイムゾーンの暦月で集計する。
    CalendarMonth,
    /// サブスクリプションの課金サイクル（current_period_start / end）で集計する。
    BillingCycle,
}

impl ResetPolicy {
    pub fn as_str(&self) -> &str {
        match self {
            ResetPolicy::CalendarMonth => "calendar_month",
            ResetPolicy::BillingCycle => "billing_cycle",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "calendar_month" => Some(ResetPolicy::CalendarMonth),
            "billing_cycle" => Some(ResetPolicy::BillingCycle),
            _ => None,
        }
    }
}

/// Granularity はバッチレイヤーの集計粒度を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Daily,
    Monthly,
}

impl Granularity {
    pub fn as_str(&self) -> &str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
        }
    }
}

/// AccountingPeriod は集計期間 [start, end) を表す。クエリ毎に生成され永続化されない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AccountingPeriod {
    /// start > end の場合は None を返す。
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// 未来の時間帯を除いた実効範囲 [start, min(end, now)) を返す。
    /// 期間開始が now 以降なら None。
    pub fn effective_range(&self, now: DateTime<Utc>) -> Option<TimeRange> {
        TimeRange::new(self.start, self.end.min(now))
    }
}

/// TimeRange は空でない半開区間 [start, end)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// start >= end（空区間）の場合は None を返す。
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}
