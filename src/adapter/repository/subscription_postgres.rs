use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entity::{Subscription, SubscriptionStatus};
use crate::domain::repository::SubscriptionLookup;

pub struct SubscriptionPostgresLookup {
    pool: Arc<PgPool>,
}

impl SubscriptionPostgresLookup {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    user_id: i64,
    plan_id: i64,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = anyhow::Error;

    fn try_from(r: SubscriptionRow) -> anyhow::Result<Self> {
        // 未知のステータスを active とみなすとクォータが誤って有効になるためエラーにする
        let status = SubscriptionStatus::from_str(&r.status).ok_or_else(|| {
            anyhow::anyhow!("subscription {} has unknown status '{}'", r.id, r.status)
        })?;
        Ok(Subscription {
            id: r.id as u64,
            user_id: r.user_id as u64,
            plan_id: r.plan_id as u64,
            status,
            current_period_start: r.current_period_start,
            current_period_end: r.current_period_end,
        })
    }
}

#[async_trait]
impl SubscriptionLookup for SubscriptionPostgresLookup {
    async fn find_by_id(&self, subscription_id: u64) -> anyhow::Result<Option<Subscription>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT id, user_id, plan_id, status, current_period_start, current_period_end \
             FROM traffic.subscriptions WHERE id = $1",
        )
        .bind(subscription_id as i64)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Subscription::try_from).transpose()
    }
}
