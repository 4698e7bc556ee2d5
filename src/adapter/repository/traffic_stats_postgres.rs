use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entity::{Granularity, HistoricalAggregate, ResourceRef};
use crate::domain::repository::BatchLayerStore;

/// TrafficStatsPostgresStore はロールアップ済みの集計テーブルを読むバッチレイヤー。
///
/// 日次行は traffic.traffic_stats_daily、月次行は traffic.traffic_stats_monthly に置かれ、
/// bucket_start はそれぞれ業務日・業務月の開始時刻。
pub struct TrafficStatsPostgresStore {
    pool: Arc<PgPool>,
}

impl TrafficStatsPostgresStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TotalRow {
    row_count: i64,
    upload: i64,
    download: i64,
}

impl TotalRow {
    fn into_aggregate(self) -> anyhow::Result<Option<HistoricalAggregate>> {
        if self.row_count == 0 {
            return Ok(None);
        }
        let upload = u64::try_from(self.upload)
            .map_err(|_| anyhow::anyhow!("negative upload total: {}", self.upload))?;
        let download = u64::try_from(self.download)
            .map_err(|_| anyhow::anyhow!("negative download total: {}", self.download))?;
        Ok(Some(HistoricalAggregate {
            upload,
            download,
            total: upload.saturating_add(download),
        }))
    }
}

fn table_for(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Daily => "traffic.traffic_stats_daily",
        Granularity::Monthly => "traffic.traffic_stats_monthly",
    }
}

#[async_trait]
impl BatchLayerStore for TrafficStatsPostgresStore {
    async fn get_total_by_resource(
        &self,
        subscription_id: u64,
        resource: ResourceRef,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>> {
        let sql = format!(
            "SELECT COUNT(*) AS row_count, \
                    COALESCE(SUM(upload), 0)::BIGINT AS upload, \
                    COALESCE(SUM(download), 0)::BIGINT AS download \
             FROM {} \
             WHERE subscription_id = $1 AND resource_type = $2 AND resource_id = $3 \
               AND bucket_start >= $4 AND bucket_start < $5",
            table_for(granularity)
        );
        let row: TotalRow = sqlx::query_as(&sql)
            .bind(subscription_id as i64)
            .bind(resource.resource_type.as_str())
            .bind(resource.resource_id as i64)
            .bind(from)
            .bind(to)
            .fetch_one(self.pool.as_ref())
            .await?;

        row.into_aggregate()
    }

    async fn get_total_by_subscription(
        &self,
        subscription_id: u64,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<HistoricalAggregate>> {
        let sql = format!(
            "SELECT COUNT(*) AS row_count, \
                    COALESCE(SUM(upload), 0)::BIGINT AS upload, \
                    COALESCE(SUM(download), 0)::BIGINT AS download \
             FROM {} \
             WHERE subscription_id = $1 AND bucket_start >= $2 AND bucket_start < $3",
            table_for(granularity)
        );
        let row: TotalRow = sqlx::query_as(&sql)
            .bind(subscription_id as i64)
            .bind(from)
            .bind(to)
            .fetch_one(self.pool.as_ref())
            .await?;

        row.into_aggregate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rows_is_none() {
        let row = TotalRow {
            row_count: 0,
            upload: 0,
            download: 0,
        };
        assert!(row.into_aggregate().unwrap().is_none());
    }

    #[test]
    fn test_total_recomputed() {
        let row = TotalRow {
            row_count: 3,
            upload: 10,
            download: 5,
        };
        let agg = row.into_aggregate().unwrap().unwrap();
        assert_eq!(agg.total, 15);
    }

    #[test]
    fn test_negative_sum_is_error() {
        let row = TotalRow {
            row_count: 1,
            upload: -1,
            download: 5,
        };
        assert!(row.into_aggregate().is_err());
    }

    #[test]
    fn test_table_for_granularity() {
        assert_eq!(table_for(Granularity::Daily), "traffic.traffic_stats_daily");
        assert_eq!(
            table_for(Granularity::Monthly),
            "traffic.traffic_stats_monthly"
        );
    }
}
