pub mod accounting;
pub mod quota;
pub mod subscription;
pub mod traffic;

pub use accounting::{AccountingPeriod, Granularity, ResetPolicy, TimeRange};
pub use quota::{CachedQuota, QuotaCheck};
pub use subscription::{Plan, Subscription, SubscriptionStatus};
pub use traffic::{
    HistoricalAggregate, ResourceRef, ResourceType, TrafficPoint, TrafficReport, UsageResult,
};
