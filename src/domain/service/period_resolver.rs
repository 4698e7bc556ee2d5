use chrono::{DateTime, Utc};

use crate::domain::entity::{AccountingPeriod, ResetPolicy, Subscription};
use crate::domain::service::BusinessCalendar;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodResolveError {
    #[error("billing cycle of subscription {subscription_id} ends before it starts")]
    InvertedBillingCycle { subscription_id: u64 },

    #[error("calendar month out of range for {0}")]
    OutOfRange(DateTime<Utc>),
}

/// PeriodResolver はプランのリセット方式から現在の集計期間を求める。
#[derive(Debug, Clone, Copy)]
pub struct PeriodResolver {
    calendar: BusinessCalendar,
}

impl PeriodResolver {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// 未来側へのクランプは行わない。クエリ範囲は `AccountingPeriod::effective_range` で絞る。
    pub fn resolve(
        &self,
        policy: ResetPolicy,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<AccountingPeriod, PeriodResolveError> {
        match policy {
            ResetPolicy::CalendarMonth => {
                let (start, end) = self
                    .calendar
                    .month_bounds(now)
                    .ok_or(PeriodResolveError::OutOfRange(now))?;
                AccountingPeriod::new(start, end).ok_or(PeriodResolveError::OutOfRange(now))
            }
            ResetPolicy::BillingCycle => AccountingPeriod::new(
                subscription.current_period_start,
                subscription.current_period_end,
            )
            .ok_or(PeriodResolveError::InvertedBillingCycle {
                subscription_id: subscription.id,
            }),
        }
    }
}
