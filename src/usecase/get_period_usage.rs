use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::entity::{AccountingPeriod, ResourceRef, UsageResult};
use crate::domain::repository::{PlanLookup, SubscriptionLookup};
use crate::domain::service::{aggregate_usage, split_period, PeriodResolver};
use crate::usecase::usage_reader::{BatchLayerReader, LayerReadError, SpeedLayerReader};

#[derive(Debug, Clone)]
pub struct GetPeriodUsageInput {
    pub subscription_id: u64,
    pub resource: Option<ResourceRef>,
}

/// PeriodUsage は現在の集計期間における使用量と、縮退したレイヤーの情報。
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodUsage {
    pub subscription_id: u64,
    pub resource: Option<ResourceRef>,
    pub period: AccountingPeriod,
    pub usage: UsageResult,
    pub limit: u64,
    pub speed_layer_degraded: bool,
    pub batch_layer_degraded: bool,
}

impl PeriodUsage {
    pub fn is_degraded(&self) -> bool {
        self.speed_layer_degraded || self.batch_layer_degraded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GetPeriodUsageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("usage unavailable: speed layer: {speed}; batch layer: {batch}")]
    Unavailable { speed: String, batch: String },

    #[error("usage computation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// GetPeriodUsageUseCase はスピードレイヤーとバッチレイヤーを合算して期間使用量を求める。
pub struct GetPeriodUsageUseCase {
    subscription_lookup: Arc<dyn SubscriptionLookup>,
    plan_lookup: Arc<dyn PlanLookup>,
    speed_reader: SpeedLayerReader,
    batch_reader: BatchLayerReader,
    resolver: PeriodResolver,
}

impl GetPeriodUsageUseCase {
    pub fn new(
        subscription_lookup: Arc<dyn SubscriptionLookup>,
        plan_lookup: Arc<dyn PlanLookup>,
        speed_reader: SpeedLayerReader,
        batch_reader: BatchLayerReader,
        resolver: PeriodResolver,
    ) -> Self {
        Self {
            subscription_lookup,
            plan_lookup,
            speed_reader,
            batch_reader,
            resolver,
        }
    }

    pub async fn execute(
        &self,
        input: &GetPeriodUsageInput,
        cancel: &CancellationToken,
    ) -> Result<PeriodUsage, GetPeriodUsageError> {
        self.execute_at(input, Utc::now(), cancel).await
    }

    pub async fn execute_at(
        &self,
        input: &GetPeriodUsageInput,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<PeriodUsage, GetPeriodUsageError> {
        let subscription = self
            .subscription_lookup
            .find_by_id(input.subscription_id)
            .await
            .map_err(|e| GetPeriodUsageError::Internal(e.to_string()))?
            .ok_or_else(|| {
                GetPeriodUsageError::NotFound(format!("subscription {}", input.subscription_id))
            })?;

        let plan = self
            .plan_lookup
            .find_by_id(subscription.plan_id)
            .await
            .map_err(|e| GetPeriodUsageError::Internal(e.to_string()))?
            .ok_or_else(|| GetPeriodUsageError::NotFound(format!("plan {}", subscription.plan_id)))?;

        let policy = plan.reset_policy().ok_or_else(|| {
            GetPeriodUsageError::InvalidConfiguration(format!(
                "plan {} has unknown reset policy '{}'",
                plan.id, plan.reset_policy
            ))
        })?;

        let period = self
            .resolver
            .resolve(policy, &subscription, now)
            .map_err(|e| GetPeriodUsageError::InvalidConfiguration(e.to_string()))?;
        let ranges = split_period(&period, now, self.resolver.calendar());

        debug!(
            subscription_id = input.subscription_id,
            reset_policy = policy.as_str(),
            cutover = %ranges.cutover,
            historical = ?ranges.historical,
            recent = ?ranges.recent,
            "resolved accounting ranges"
        );

        let (recent, historical) = tokio::join!(
            self.speed_reader.get_recent_points(
                input.subscription_id,
                input.resource,
                ranges.recent,
                cancel,
            ),
            self.batch_reader.get_historical_total(
                input.subscription_id,
                input.resource,
                ranges.historical,
                cancel,
            ),
        );

        let (points, historical, speed_degraded, batch_degraded) = match (recent, historical) {
            (Err(e), _) | (_, Err(e)) if e.is_cancelled() => {
                return Err(GetPeriodUsageError::Cancelled);
            }
            (Err(speed), Err(batch)) => {
                return Err(GetPeriodUsageError::Unavailable {
                    speed: speed.to_string(),
                    batch: batch.to_string(),
                });
            }
            (Ok(points), Ok(historical)) => (points, historical, false, false),
            (Err(e), Ok(historical)) => {
                log_degraded("speed", input.subscription_id, &e);
                (Vec::new(), historical, true, false)
            }
            (Ok(points), Err(e)) => {
                log_degraded("batch", input.subscription_id, &e);
                (points, None, false, true)
            }
        };

        let usage = aggregate_usage(&points, historical.as_ref());

        Ok(PeriodUsage {
            subscription_id: input.subscription_id,
            resource: input.resource,
            period,
            usage,
            limit: plan.traffic_limit(),
            speed_layer_degraded: speed_degraded,
            batch_layer_degraded: batch_degraded,
        })
    }
}

fn log_degraded(layer: &str, subscription_id: u64, error: &LayerReadError) {
    warn!(
        layer = layer,
        subscription_id = subscription_id,
        error = %error,
        "layer read failed, continuing without its contribution"
    );
}
