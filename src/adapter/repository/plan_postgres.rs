use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entity::Plan;
use crate::domain::repository::PlanLookup;

pub struct PlanPostgresLookup {
    pool: Arc<PgPool>,
}

impl PlanPostgresLookup {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: i64,
    name: String,
    plan_type: String,
    traffic_limit: i64,
    reset_policy: String,
}

impl TryFrom<PlanRow> for Plan {
    type Error = anyhow::Error;

    fn try_from(r: PlanRow) -> anyhow::Result<Self> {
        let traffic_limit = u64::try_from(r.traffic_limit).map_err(|_| {
            anyhow::anyhow!("plan {} has negative traffic_limit: {}", r.id, r.traffic_limit)
        })?;
        Ok(Plan {
            id: r.id as u64,
            name: r.name,
            plan_type: r.plan_type,
            traffic_limit,
            reset_policy: r.reset_policy,
        })
    }
}

#[async_trait]
impl PlanLookup for PlanPostgresLookup {
    async fn find_by_id(&self, plan_id: u64) -> anyhow::Result<Option<Plan>> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT id, name, plan_type, traffic_limit, reset_policy \
             FROM traffic.plans WHERE id = $1",
        )
        .bind(plan_id as i64)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Plan::try_from).transpose()
    }
}
