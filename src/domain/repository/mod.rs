pub mod lookup;
pub mod quota_cache_store;
pub mod traffic_store;

pub use lookup::{PlanLookup, SubscriptionLookup};
pub use quota_cache_store::QuotaCacheStore;
pub use traffic_store::{BatchLayerStore, SpeedLayerStore};
