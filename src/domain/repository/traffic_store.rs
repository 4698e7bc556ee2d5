use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entity::{
    Granularity, HistoricalAggregate, ResourceRef, TrafficPoint, TrafficReport,
};

/// SpeedLayerStore は直近トラフィックの1時間単位カウンターを保持する（Redis）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeedLayerStore: Send + Sync {
    /// [from, to) に重なる時間バケットのポイントを返す。
    /// resource が None の場合はサブスクリプション全体のロールアップを返す。
    async fn get_range(
        &self,
        subscription_id: u64,
        resource: Option<ResourceRef>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TrafficPoint>>;

    /// 報告された増分をリソース単位とサブスクリプション全体の両バケットに加算する。
    async fn accumulate(&self, report: &TrafficReport) -> anyhow::Result<()>;
}

/// BatchLayerStore はロールアップ済みの日次・月次集計を保持する（PostgreSQL）。
///
/// 集計行が1件も無い場合は Ok(None) を返す。これは使用量ゼロを意味する。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchLayerStore: Send + Sync {
    async fn get_total_by_resource(
        &self,
        subscription_id: u64,
        resource: ResourceRef,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>>;

    /// リソース種別を横断したサブスクリプション全体の合計。
    async fn get_total_by_subscription(
        &self,
        subscription_id: u64,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>>;
}
