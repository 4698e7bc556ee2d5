use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entity::Subscription;
use crate::infrastructure::task_queue::{TaskHandler, TaskQueue, TaskQueueError, TaskQueueStats};
use crate::usecase::quota_cache_sync::QuotaCacheSyncUseCase;

/// SubscriptionEvent はクォータキャッシュに影響するサブスクリプションのライフサイクルイベント。
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Activated(Subscription),
    Renewed(Subscription),
    PlanChanged { subscription_id: u64 },
    Suspended { subscription_id: u64 },
    Resumed { subscription_id: u64 },
    Terminated { subscription_id: u64 },
}

impl SubscriptionEvent {
    pub fn subscription_id(&self) -> u64 {
        match self {
            SubscriptionEvent::Activated(s) | SubscriptionEvent::Renewed(s) => s.id,
            SubscriptionEvent::PlanChanged { subscription_id }
            | SubscriptionEvent::Suspended { subscription_id }
            | SubscriptionEvent::Resumed { subscription_id }
            | SubscriptionEvent::Terminated { subscription_id } => *subscription_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionEvent::Activated(_) => "activated",
            SubscriptionEvent::Renewed(_) => "renewed",
            SubscriptionEvent::PlanChanged { .. } => "plan_changed",
            SubscriptionEvent::Suspended { .. } => "suspended",
            SubscriptionEvent::Resumed { .. } => "resumed",
            SubscriptionEvent::Terminated { .. } => "terminated",
        }
    }
}

/// SubscriptionEventHandler はイベントをクォータキャッシュ同期操作に変換する。
///
/// プラン変更と終了は無効化のみ行い、次回参照時の遅延ロードで再構築させる。
pub struct SubscriptionEventHandler {
    sync: Arc<QuotaCacheSyncUseCase>,
}

impl SubscriptionEventHandler {
    pub fn new(sync: Arc<QuotaCacheSyncUseCase>) -> Self {
        Self { sync }
    }
}

#[async_trait]
impl TaskHandler<SubscriptionEvent> for SubscriptionEventHandler {
    async fn handle(&self, event: SubscriptionEvent) -> anyhow::Result<()> {
        let subscription_id = event.subscription_id();
        tracing::debug!(subscription_id, event = event.kind(), "handling subscription event");

        match event {
            SubscriptionEvent::Activated(subscription) | SubscriptionEvent::Renewed(subscription) => {
                self.sync.sync_from_subscription(&subscription).await?;
            }
            SubscriptionEvent::PlanChanged { .. } | SubscriptionEvent::Terminated { .. } => {
                self.sync.invalidate(subscription_id).await?;
            }
            SubscriptionEvent::Suspended { .. } => {
                self.sync.set_suspended(subscription_id, true).await?;
            }
            SubscriptionEvent::Resumed { .. } => {
                self.sync.set_suspended(subscription_id, false).await?;
            }
        }
        Ok(())
    }
}

/// SubscriptionEventDispatcher はイベントを容量制限付きワーカープールへ投入する。
///
/// サブスクリプション ID をパーティションキーにするため、同一サブスクリプションの
/// イベントは投入順に処理される（Activated の同期より後に Terminated の無効化が走る）。
pub struct SubscriptionEventDispatcher {
    queue: TaskQueue<SubscriptionEvent>,
}

impl SubscriptionEventDispatcher {
    pub fn start(sync: Arc<QuotaCacheSyncUseCase>, workers: usize, capacity: usize) -> Self {
        let handler = Arc::new(SubscriptionEventHandler::new(sync));
        Self {
            queue: TaskQueue::start("subscription_events", handler, workers, capacity),
        }
    }

    pub fn submit(&self, event: SubscriptionEvent) -> Result<(), TaskQueueError> {
        let subscription_id = event.subscription_id();
        let kind = event.kind();
        self.queue.submit(subscription_id, event).inspect_err(|e| {
            tracing::warn!(subscription_id, event = kind, error = %e, "subscription event rejected");
        })
    }

    pub fn stats(&self) -> Arc<TaskQueueStats> {
        self.queue.stats()
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Plan, SubscriptionStatus};
    use crate::domain::repository::lookup::{MockPlanLookup, MockSubscriptionLookup};
    use crate::domain::repository::quota_cache_store::MockQuotaCacheStore;
    use crate::domain::service::{BusinessCalendar, PeriodResolver};
    use chrono::{TimeZone, Utc};

    fn subscription() -> Subscription {
        Subscription {
            id: 4,
            user_id: 1,
            plan_id: 9,
            status: SubscriptionStatus::Active,
            current_period_start: Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap(),
            current_period_end: Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap(),
        }
    }

    fn handler(cache: MockQuotaCacheStore) -> SubscriptionEventHandler {
        let mut plans = MockPlanLookup::new();
        plans.expect_find_by_id().returning(|id| {
            Ok(Some(Plan {
                id,
                name: "basic".to_string(),
                plan_type: "monthly".to_string(),
                traffic_limit: 1 << 30,
                reset_policy: "billing_cycle".to_string(),
            }))
        });
        SubscriptionEventHandler::new(Arc::new(QuotaCacheSyncUseCase::new(
            Arc::new(MockSubscriptionLookup::new()),
            Arc::new(plans),
            Arc::new(cache),
            PeriodResolver::new(BusinessCalendar::utc()),
        )))
    }

    #[tokio::test]
    async fn test_activated_syncs() {
        let mut cache = MockQuotaCacheStore::new();
        cache
            .expect_set()
            .withf(|q| q.subscription_id == 4 && q.limit == 1 << 30)
            .times(1)
            .returning(|_| Ok(()));

        let h = handler(cache);
        h.handle(SubscriptionEvent::Activated(subscription()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_plan_change_invalidates() {
        let mut cache = MockQuotaCacheStore::new();
        cache.expect_set().never();
        cache
            .expect_invalidate()
            .withf(|id| *id == 4)
            .times(1)
            .returning(|_| Ok(()));

        let h = handler(cache);
        h.handle(SubscriptionEvent::PlanChanged { subscription_id: 4 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_suspend_and_resume_touch_flag_only() {
        let mut cache = MockQuotaCacheStore::new();
        cache.expect_set().never();
        cache
            .expect_set_suspended_flag()
            .withf(|id, flag| *id == 4 && *flag)
            .times(1)
            .returning(|_, _| Ok(true));
        cache
            .expect_set_suspended_flag()
            .withf(|id, flag| *id == 4 && !*flag)
            .times(1)
            .returning(|_, _| Ok(true));

        let h = handler(cache);
        h.handle(SubscriptionEvent::Suspended { subscription_id: 4 })
            .await
            .unwrap();
        h.handle(SubscriptionEvent::Resumed { subscription_id: 4 })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_error() {
        let mut cache = MockQuotaCacheStore::new();
        cache
            .expect_invalidate()
            .returning(|_| Err(anyhow::anyhow!("redis down")));

        let h = handler(cache);
        let err = h
            .handle(SubscriptionEvent::Terminated { subscription_id: 4 })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("redis down"));
    }

    #[tokio::test]
    async fn test_dispatcher_drains_on_shutdown() {
        let mut cache = MockQuotaCacheStore::new();
        cache.expect_invalidate().times(3).returning(|_| Ok(()));
        let mut plans = MockPlanLookup::new();
        plans.expect_find_by_id().never();
        let sync = Arc::new(QuotaCacheSyncUseCase::new(
            Arc::new(MockSubscriptionLookup::new()),
            Arc::new(plans),
            Arc::new(cache),
            PeriodResolver::new(BusinessCalendar::utc()),
        ));

        let dispatcher = SubscriptionEventDispatcher::start(sync, 2, 8);
        for id in 1..=3 {
            dispatcher
                .submit(SubscriptionEvent::Terminated {
                    subscription_id: id,
                })
                .unwrap();
        }
        dispatcher.shutdown().await;

        assert_eq!(dispatcher.stats().processed(), 3);
        assert_eq!(
            dispatcher.submit(SubscriptionEvent::Resumed { subscription_id: 1 }),
            Err(TaskQueueError::ShuttingDown)
        );
    }
}
