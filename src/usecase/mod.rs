pub mod check_quota;
pub mod get_period_usage;
pub mod quota_cache_sync;
pub mod record_traffic;
pub mod subscription_event;
pub mod usage_reader;

pub use check_quota::CheckQuotaUseCase;
pub use get_period_usage::GetPeriodUsageUseCase;
pub use quota_cache_sync::QuotaCacheSyncUseCase;
pub use record_traffic::RecordTrafficUseCase;
pub use subscription_event::{SubscriptionEvent, SubscriptionEventDispatcher};
pub use usage_reader::{BatchLayerReader, SpeedLayerReader};
