use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::entity::{
    CachedQuota, Granularity, HistoricalAggregate, Plan, ResourceRef, Subscription, TrafficPoint,
    TrafficReport,
};
use crate::domain::repository::{
    BatchLayerStore, PlanLookup, QuotaCacheStore, SpeedLayerStore, SubscriptionLookup,
};
use crate::domain::service::BusinessCalendar;

type PointKey = (u64, Option<ResourceRef>, DateTime<Utc>);

/// InMemorySpeedLayerStore は Redis が無い環境用のスピードレイヤー。TTL による削除は行わない。
pub struct InMemorySpeedLayerStore {
    calendar: BusinessCalendar,
    points: RwLock<HashMap<PointKey, (i64, i64)>>,
}

impl InMemorySpeedLayerStore {
    pub fn new(calendar: BusinessCalendar) -> Self {
        Self {
            calendar,
            points: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SpeedLayerStore for InMemorySpeedLayerStore {
    async fn get_range(
        &self,
        subscription_id: u64,
        resource: Option<ResourceRef>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TrafficPoint>> {
        let first_bucket = self.calendar.hour_bucket(from);
        let points = self.points.read().await;
        let mut result: Vec<TrafficPoint> = points
            .iter()
            .filter(|((sub, res, hour), _)| {
                *sub == subscription_id && *res == resource && *hour >= first_bucket && *hour < to
            })
            .map(|((_, _, hour), (upload, download))| TrafficPoint {
                subscription_id,
                resource,
                period_hour: *hour,
                upload: *upload,
                download: *download,
            })
            .collect();
        result.sort_by_key(|p| p.period_hour);
        Ok(result)
    }

    async fn accumulate(&self, report: &TrafficReport) -> anyhow::Result<()> {
        let upload = i64::try_from(report.upload)?;
        let download = i64::try_from(report.download)?;
        let bucket = self.calendar.hour_bucket(report.reported_at);

        let mut points = self.points.write().await;
        for resource in [Some(report.resource), None] {
            let entry = points
                .entry((report.subscription_id, resource, bucket))
                .or_insert((0, 0));
            entry.0 = entry.0.saturating_add(upload);
            entry.1 = entry.1.saturating_add(download);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct AggregateRow {
    subscription_id: u64,
    resource: ResourceRef,
    granularity: Granularity,
    bucket_start: DateTime<Utc>,
    upload: u64,
    download: u64,
}

/// InMemoryBatchLayerStore は PostgreSQL が無い環境用のバッチレイヤー。
/// ロールアップ処理の代わりに `insert_aggregate` で集計行を投入する。
#[derive(Default)]
pub struct InMemoryBatchLayerStore {
    rows: RwLock<Vec<AggregateRow>>,
}

impl InMemoryBatchLayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_aggregate(
        &self,
        subscription_id: u64,
        resource: ResourceRef,
        granularity: Granularity,
        bucket_start: DateTime<Utc>,
        upload: u64,
        download: u64,
    ) {
        self.rows.write().await.push(AggregateRow {
            subscription_id,
            resource,
            granularity,
            bucket_start,
            upload,
            download,
        });
    }

    async fn sum(
        &self,
        matches: impl Fn(&AggregateRow) -> bool + Send,
    ) -> Option<HistoricalAggregate> {
        let rows = self.rows.read().await;
        let mut found = false;
        let mut total = HistoricalAggregate::default();
        for row in rows.iter().filter(|r| matches(r)) {
            found = true;
            total.upload = total.upload.saturating_add(row.upload);
            total.download = total.download.saturating_add(row.download);
        }
        total.total = total.upload.saturating_add(total.download);
        found.then_some(total)
    }
}

#[async_trait]
impl BatchLayerStore for InMemoryBatchLayerStore {
    async fn get_total_by_resource(
        &self,
        subscription_id: u64,
        resource: ResourceRef,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>> {
        Ok(self
            .sum(|r| {
                r.subscription_id == subscription_id
                    && r.resource == resource
                    && r.granularity == granularity
                    && r.bucket_start >= from
                    && r.bucket_start < to
            })
            .await)
    }

    async fn get_total_by_subscription(
        &self,
        subscription_id: u64,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>> {
        Ok(self
            .sum(|r| {
                r.subscription_id == subscription_id
                    && r.granularity == granularity
                    && r.bucket_start >= from
                    && r.bucket_start < to
            })
            .await)
    }
}

#[derive(Default)]
pub struct InMemoryQuotaCacheStore {
    entries: RwLock<HashMap<u64, CachedQuota>>,
}

impl InMemoryQuotaCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuotaCacheStore for InMemoryQuotaCacheStore {
    async fn get(&self, subscription_id: u64) -> anyhow::Result<Option<CachedQuota>> {
        Ok(self.entries.read().await.get(&subscription_id).cloned())
    }

    async fn set(&self, quota: &CachedQuota) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(quota.subscription_id, quota.clone());
        Ok(())
    }

    async fn invalidate(&self, subscription_id: u64) -> anyhow::Result<()> {
        self.entries.write().await.remove(&subscription_id);
        Ok(())
    }

    async fn set_suspended_flag(
        &self,
        subscription_id: u64,
        suspended: bool,
    ) -> anyhow::Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&subscription_id) {
            Some(quota) => {
                quota.suspended = suspended;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPlanLookup {
    plans: RwLock<HashMap<u64, Plan>>,
}

impl InMemoryPlanLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, plan: Plan) {
        self.plans.write().await.insert(plan.id, plan);
    }
}

#[async_trait]
impl PlanLookup for InMemoryPlanLookup {
    async fn find_by_id(&self, plan_id: u64) -> anyhow::Result<Option<Plan>> {
        Ok(self.plans.read().await.get(&plan_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionLookup {
    subscriptions: RwLock<HashMap<u64, Subscription>>,
}

impl InMemorySubscriptionLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }
}

#[async_trait]
impl SubscriptionLookup for InMemorySubscriptionLookup {
    async fn find_by_id(&self, subscription_id: u64) -> anyhow::Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .get(&subscription_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, d, h, m, 0).unwrap()
    }

    fn report(resource_id: u64, reported_at: DateTime<Utc>, up: u64, down: u64) -> TrafficReport {
        TrafficReport {
            subscription_id: 1,
            resource: ResourceRef::node(resource_id),
            upload: up,
            download: down,
            reported_at,
        }
    }

    #[tokio::test]
    async fn test_speed_layer_accumulates_into_hour_buckets() {
        let store = InMemorySpeedLayerStore::new(BusinessCalendar::utc());
        store.accumulate(&report(7, at(21, 3, 10), 10, 20)).await.unwrap();
        store.accumulate(&report(7, at(21, 3, 50), 5, 5)).await.unwrap();
        store.accumulate(&report(8, at(21, 4, 5), 1, 1)).await.unwrap();

        let node7 = store
            .get_range(1, Some(ResourceRef::node(7)), at(21, 0, 0), at(21, 5, 0))
            .await
            .unwrap();
        assert_eq!(node7.len(), 1);
        assert_eq!(node7[0].period_hour, at(21, 3, 0));
        assert_eq!((node7[0].upload, node7[0].download), (15, 25));

        let rollup = store
            .get_range(1, None, at(21, 0, 0), at(21, 5, 0))
            .await
            .unwrap();
        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[1].period_hour, at(21, 4, 0));
    }

    #[tokio::test]
    async fn test_speed_layer_range_includes_partial_first_hour() {
        let store = InMemorySpeedLayerStore::new(BusinessCalendar::utc());
        store.accumulate(&report(7, at(21, 3, 10), 10, 0)).await.unwrap();
        let points = store
            .get_range(1, None, at(21, 3, 30), at(21, 5, 0))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);

        let none = store
            .get_range(1, None, at(21, 4, 0), at(21, 5, 0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_batch_layer_no_rows_is_none() {
        let store = InMemoryBatchLayerStore::new();
        store
            .insert_aggregate(1, ResourceRef::node(7), Granularity::Daily, at(5, 0, 0), 10, 20)
            .await;
        store
            .insert_aggregate(1, ResourceRef::node(8), Granularity::Daily, at(6, 0, 0), 1, 2)
            .await;

        let all = store
            .get_total_by_subscription(1, Granularity::Daily, at(1, 0, 0), at(20, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.total, 33);

        let node8 = store
            .get_total_by_resource(1, ResourceRef::node(8), Granularity::Daily, at(1, 0, 0), at(20, 0, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(node8.upload, 1);

        let single_day = store
            .get_total_by_subscription(1, Granularity::Daily, at(6, 0, 0), at(6, 0, 1))
            .await
            .unwrap();
        assert_eq!(single_day.unwrap().total, 3);
        let none = store
            .get_total_by_subscription(2, Granularity::Daily, at(1, 0, 0), at(20, 0, 0))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_quota_cache_suspend_missing_entry() {
        let store = InMemoryQuotaCacheStore::new();
        assert!(!store.set_suspended_flag(1, true).await.unwrap());
        assert!(store.get(1).await.unwrap().is_none());
    }
}
