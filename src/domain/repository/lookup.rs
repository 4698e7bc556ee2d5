use async_trait::async_trait;

use crate::domain::entity::{Plan, Subscription};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanLookup: Send + Sync {
    async fn find_by_id(&self, plan_id: u64) -> anyhow::Result<Option<Plan>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    async fn find_by_id(&self, subscription_id: u64) -> anyhow::Result<Option<Subscription>>;
}
