use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;

use crate::domain::entity::{ResourceRef, TrafficPoint, TrafficReport};
use crate::domain::repository::SpeedLayerStore;
use crate::domain::service::BusinessCalendar;

const FIELD_UPLOAD: &str = "upload";
const FIELD_DOWNLOAD: &str = "download";

/// RedisSpeedLayerStore は Redis ハッシュで1時間単位のトラフィックカウンターを保持する。
///
/// キーは `{prefix}{subscription_id}:{resource_type}:{resource_id}:{bucket}` と、
/// サブスクリプション全体のロールアップ `{prefix}{subscription_id}:all:{bucket}`。
/// bucket は業務タイムゾーンの正時の Unix 秒。加算は HINCRBY で行い、TTL で自然に消える。
pub struct RedisSpeedLayerStore {
    conn: ConnectionManager,
    key_prefix: String,
    calendar: BusinessCalendar,
    ttl: Duration,
}

impl RedisSpeedLayerStore {
    pub fn new(
        conn: ConnectionManager,
        key_prefix: String,
        calendar: BusinessCalendar,
        ttl: Duration,
    ) -> Self {
        Self {
            conn,
            key_prefix,
            calendar,
            ttl,
        }
    }
}

#[async_trait]
impl SpeedLayerStore for RedisSpeedLayerStore {
    async fn get_range(
        &self,
        subscription_id: u64,
        resource: Option<ResourceRef>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<TrafficPoint>> {
        let buckets = self.calendar.hour_buckets(from, to);
        if buckets.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for bucket in &buckets {
            pipe.cmd("HMGET")
                .arg(build_key(&self.key_prefix, subscription_id, resource, *bucket))
                .arg(FIELD_UPLOAD)
                .arg(FIELD_DOWNLOAD);
        }
        let mut conn = self.conn.clone();
        let rows: Vec<(Option<i64>, Option<i64>)> = pipe.query_async(&mut conn).await?;

        let points = buckets
            .into_iter()
            .zip(rows)
            .filter(|(_, (upload, download))| upload.is_some() || download.is_some())
            .map(|(period_hour, (upload, download))| TrafficPoint {
                subscription_id,
                resource,
                period_hour,
                upload: upload.unwrap_or(0),
                download: download.unwrap_or(0),
            })
            .collect();
        Ok(points)
    }

    async fn accumulate(&self, report: &TrafficReport) -> anyhow::Result<()> {
        let upload = i64::try_from(report.upload).context("upload delta exceeds i64")?;
        let download = i64::try_from(report.download).context("download delta exceeds i64")?;
        let bucket = self.calendar.hour_bucket(report.reported_at);
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);

        let keys = [
            build_key(
                &self.key_prefix,
                report.subscription_id,
                Some(report.resource),
                bucket,
            ),
            build_key(&self.key_prefix, report.subscription_id, None, bucket),
        ];

        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in &keys {
            pipe.cmd("HINCRBY")
                .arg(key)
                .arg(FIELD_UPLOAD)
                .arg(upload)
                .ignore()
                .cmd("HINCRBY")
                .arg(key)
                .arg(FIELD_DOWNLOAD)
                .arg(download)
                .ignore()
                .cmd("EXPIRE")
                .arg(key)
                .arg(ttl)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

fn build_key(
    prefix: &str,
    subscription_id: u64,
    resource: Option<ResourceRef>,
    bucket: DateTime<Utc>,
) -> String {
    match resource {
        Some(r) => format!(
            "{}{}:{}:{}:{}",
            prefix,
            subscription_id,
            r.resource_type.as_str(),
            r.resource_id,
            bucket.timestamp()
        ),
        None => format!("{}{}:all:{}", prefix, subscription_id, bucket.timestamp()),
    }
}
