use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::entity::{CachedQuota, Subscription};
use crate::domain::repository::{PlanLookup, QuotaCacheStore, SubscriptionLookup};
use crate::domain::service::PeriodResolver;

#[derive(Debug, thiserror::Error)]
pub enum QuotaCacheSyncError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// QuotaCacheSyncUseCase はサブスクリプション毎のクォータスナップショットを高速ストアに同期する。
///
/// キャッシュの状態遷移:
/// 未キャッシュ → キャッシュ済み（有効） → 無効化 → キャッシュ済み（有効）。
/// 有効でないサブスクリプションは無効化されたまま再キャッシュしない。
pub struct QuotaCacheSyncUseCase {
    subscription_lookup: Arc<dyn SubscriptionLookup>,
    plan_lookup: Arc<dyn PlanLookup>,
    cache: Arc<dyn QuotaCacheStore>,
    resolver: PeriodResolver,
}

impl QuotaCacheSyncUseCase {
    pub fn new(
        subscription_lookup: Arc<dyn SubscriptionLookup>,
        plan_lookup: Arc<dyn PlanLookup>,
        cache: Arc<dyn QuotaCacheStore>,
        resolver: PeriodResolver,
    ) -> Self {
        Self {
            subscription_lookup,
            plan_lookup,
            cache,
            resolver,
        }
    }

    /// 現在のプランとサブスクリプションからスナップショットを作り直して書き込む。
    /// suspended は常に false。有効でないサブスクリプションはキャッシュせず無効化する。
    pub async fn sync_from_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<CachedQuota>, QuotaCacheSyncError> {
        if !subscription.is_active() {
            info!(
                subscription_id = subscription.id,
                status = subscription.status.as_str(),
                "subscription not active, invalidating quota cache instead of syncing"
            );
            self.invalidate(subscription.id).await?;
            return Ok(None);
        }

        let quota = self.build_snapshot(subscription).await?;
        self.cache
            .set(&quota)
            .await
            .map_err(|e| QuotaCacheSyncError::Internal(e.to_string()))?;

        info!(
            subscription_id = quota.subscription_id,
            limit = quota.limit,
            period_start = %quota.period_start,
            period_end = %quota.period_end,
            "quota cache synced"
        );
        Ok(Some(quota))
    }

    /// suspended フラグのみを更新する。エントリが無い場合は作成せず false を返す。
    pub async fn set_suspended(
        &self,
        subscription_id: u64,
        suspended: bool,
    ) -> Result<bool, QuotaCacheSyncError> {
        let updated = self
            .cache
            .set_suspended_flag(subscription_id, suspended)
            .await
            .map_err(|e| QuotaCacheSyncError::Internal(e.to_string()))?;
        if !updated {
            debug!(subscription_id, suspended, "no cached quota to flag");
        }
        Ok(updated)
    }

    /// キャッシュミス時の遅延ロード。サブスクリプションが存在しないか有効でない場合は Ok(None)。
    ///
    /// イベントワーカーとは直列化されないため、読み出しと書き込みの間に走った
    /// invalidate を上書きすることがある。その場合もエントリは period_end（または TTL）で失効する。
    pub async fn load_by_id(
        &self,
        subscription_id: u64,
    ) -> Result<Option<CachedQuota>, QuotaCacheSyncError> {
        let subscription = self
            .subscription_lookup
            .find_by_id(subscription_id)
            .await
            .map_err(|e| QuotaCacheSyncError::Internal(e.to_string()))?;

        match subscription {
            Some(subscription) if subscription.is_active() => {
                self.sync_from_subscription(&subscription).await
            }
            Some(subscription) => {
                debug!(
                    subscription_id,
                    status = subscription.status.as_str(),
                    "inactive subscription has no quota to enforce"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self, subscription_id: u64) -> Result<(), QuotaCacheSyncError> {
        self.cache
            .invalidate(subscription_id)
            .await
            .map_err(|e| QuotaCacheSyncError::Internal(e.to_string()))
    }

    /// キャッシュを読み、ミスなら load_by_id で補充する。
    /// キャッシュの読み出し失敗はエラーにせず load_by_id にフォールバックする。
    pub async fn get_or_load(
        &self,
        subscription_id: u64,
    ) -> Result<Option<CachedQuota>, QuotaCacheSyncError> {
        match self.cache.get(subscription_id).await {
            Ok(Some(quota)) => return Ok(Some(quota)),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    subscription_id,
                    error = %e,
                    "quota cache read failed, loading from system of record"
                );
            }
        }
        self.load_by_id(subscription_id).await
    }

    async fn build_snapshot(
        &self,
        subscription: &Subscription,
    ) -> Result<CachedQuota, QuotaCacheSyncError> {
        let plan = self
            .plan_lookup
            .find_by_id(subscription.plan_id)
            .await
            .map_err(|e| QuotaCacheSyncError::Internal(e.to_string()))?
            .ok_or_else(|| {
                QuotaCacheSyncError::NotFound(format!("plan {}", subscription.plan_id))
            })?;

        let policy = plan.reset_policy().ok_or_else(|| {
            QuotaCacheSyncError::InvalidConfiguration(format!(
                "plan {} has unknown reset policy '{}'",
                plan.id, plan.reset_policy
            ))
        })?;
        let period = self
            .resolver
            .resolve(policy, subscription, Utc::now())
            .map_err(|e| QuotaCacheSyncError::InvalidConfiguration(e.to_string()))?;

        Ok(CachedQuota {
            subscription_id: subscription.id,
            limit: plan.traffic_limit(),
            period_start: period.start,
            period_end: period.end,
            plan_type: plan.plan_type,
            suspended: false,
        })
    }
}
