use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::entity::{
    Granularity, HistoricalAggregate, ResourceRef, TimeRange, TrafficPoint,
};
use crate::domain::repository::{BatchLayerStore, SpeedLayerStore};
use crate::domain::service::BusinessCalendar;

/// LayerReadError はスピード／バッチレイヤー読み出しの失敗。
///
/// Unavailable と TimedOut は呼び出し側で「寄与ゼロ」として縮退扱いにする。
/// Cancelled は呼び出し元のキャンセルであり、縮退させずに伝播する。
#[derive(Debug, thiserror::Error)]
pub enum LayerReadError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("read timed out after {0:?}")]
    TimedOut(Duration),

    #[error("read cancelled")]
    Cancelled,
}

impl LayerReadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LayerReadError::Cancelled)
    }
}

async fn guarded<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    read: F,
) -> Result<T, LayerReadError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LayerReadError::Cancelled),
        result = tokio::time::timeout(timeout, read) => match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LayerReadError::Unavailable(e.to_string())),
            Err(_) => Err(LayerReadError::TimedOut(timeout)),
        },
    }
}

/// SpeedLayerReader は直近範囲の1時間単位ポイントを読み出す。
pub struct SpeedLayerReader {
    store: Arc<dyn SpeedLayerStore>,
    timeout: Duration,
}

impl SpeedLayerReader {
    pub fn new(store: Arc<dyn SpeedLayerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// range が None（空区間）の場合はストアにアクセスしない。
    pub async fn get_recent_points(
        &self,
        subscription_id: u64,
        resource: Option<ResourceRef>,
        range: Option<TimeRange>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TrafficPoint>, LayerReadError> {
        let Some(range) = range else {
            return Ok(Vec::new());
        };
        guarded(
            self.timeout,
            cancel,
            self.store
                .get_range(subscription_id, resource, range.start, range.end),
        )
        .await
    }
}

/// BatchLayerReader は履歴範囲の日次集計合計を読み出す。
pub struct BatchLayerReader {
    store: Arc<dyn BatchLayerStore>,
    calendar: BusinessCalendar,
    timeout: Duration,
}

impl BatchLayerReader {
    pub fn new(
        store: Arc<dyn BatchLayerStore>,
        calendar: BusinessCalendar,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            calendar,
            timeout,
        }
    }

    /// 日次行はその業務日の開始時刻をキーに持つため、開始側は業務日の頭に揃えてから問い合わせる。
    /// 終了側は cutover（業務日境界）なので揃え直さない。
    pub async fn get_historical_total(
        &self,
        subscription_id: u64,
        resource: Option<ResourceRef>,
        range: Option<TimeRange>,
        cancel: &CancellationToken,
    ) -> Result<Option<HistoricalAggregate>, LayerReadError> {
        let Some(range) = range else {
            return Ok(None);
        };
        let from = self.calendar.start_of_day(range.start);
        let granularity = Granularity::Daily;

        match resource {
            Some(resource) => {
                guarded(
                    self.timeout,
                    cancel,
                    self.store.get_total_by_resource(
                        subscription_id,
                        resource,
                        granularity,
                        from,
                        range.end,
                    ),
                )
                .await
            }
            None => {
                guarded(
                    self.timeout,
                    cancel,
                    self.store.get_total_by_subscription(
                        subscription_id,
                        granularity,
                        from,
                        range.end,
                    ),
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::traffic_store::{MockBatchLayerStore, MockSpeedLayerStore};
    use chrono::{DateTime, TimeZone, Utc};

    fn utc(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, d, h, 0, 0).unwrap()
    }

    fn range(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<TimeRange> {
        TimeRange::new(start, end)
    }

    #[tokio::test]
    async fn test_speed_empty_range_skips_store() {
        let mut store = MockSpeedLayerStore::new();
        store.expect_get_range().never();

        let reader = SpeedLayerReader::new(Arc::new(store), Duration::from_secs(1));
        let points = reader
            .get_recent_points(1, None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(points.is_empty());
    }

    #[tokio::test]
    async fn test_speed_store_error_is_unavailable() {
        let mut store = MockSpeedLayerStore::new();
        store
            .expect_get_range()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("connection refused")));

        let reader = SpeedLayerReader::new(Arc::new(store), Duration::from_secs(1));
        let err = reader
            .get_recent_points(1, None, range(utc(20, 0), utc(21, 15)), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            LayerReadError::Unavailable(msg) => assert!(msg.contains("connection refused")),
            e => unreachable!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let mut store = MockSpeedLayerStore::new();
        store.expect_get_range().returning(|_, _, _, _| Ok(vec![]));

        let reader = SpeedLayerReader::new(Arc::new(store), Duration::from_secs(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = reader
            .get_recent_points(1, None, range(utc(20, 0), utc(21, 15)), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_guarded_timeout() {
        let err = guarded::<(), _>(Duration::from_millis(10), &CancellationToken::new(), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, LayerReadError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_batch_aligns_start_to_business_day() {
        let mut store = MockBatchLayerStore::new();
        store
            .expect_get_total_by_subscription()
            .withf(|id, g, from, to| {
                *id == 3 && *g == Granularity::Daily && *from == utc(5, 0) && *to == utc(20, 0)
            })
            .returning(|_, _, _, _| {
                Ok(Some(HistoricalAggregate {
                    upload: 1,
                    download: 2,
                    total: 3,
                }))
            });

        let reader = BatchLayerReader::new(
            Arc::new(store),
            BusinessCalendar::utc(),
            Duration::from_secs(1),
        );
        let total = reader
            .get_historical_total(3, None, range(utc(5, 8), utc(20, 0)), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(total.unwrap().download, 2);
    }

    #[tokio::test]
    async fn test_batch_resource_scope() {
        let mut store = MockBatchLayerStore::new();
        store.expect_get_total_by_subscription().never();
        store
            .expect_get_total_by_resource()
            .withf(|id, r, _, _, _| *id == 3 && *r == ResourceRef::node(11))
            .returning(|_, _, _, _, _| Ok(None));

        let reader = BatchLayerReader::new(
            Arc::new(store),
            BusinessCalendar::utc(),
            Duration::from_secs(1),
        );
        let total = reader
            .get_historical_total(
                3,
                Some(ResourceRef::node(11)),
                range(utc(1, 0), utc(20, 0)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(total.is_none());
    }
}
