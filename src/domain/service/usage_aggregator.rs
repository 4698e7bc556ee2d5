use crate::domain::entity::{HistoricalAggregate, TrafficPoint, UsageResult};

/// スピードレイヤーのポイントとバッチレイヤーの集計を1つの使用量に合算する。
///
/// 入力を変更しない純関数で、合算順序に依存しない。加算は飽和演算で行う。
/// 履歴側の total は参照せず、upload + download から導出し直す。
pub fn aggregate_usage(
    points: &[TrafficPoint],
    historical: Option<&HistoricalAggregate>,
) -> UsageResult {
    let (mut upload, mut download) = sum_points(points);
    if let Some(h) = historical {
        upload = upload.saturating_add(h.upload);
        download = download.saturating_add(h.download);
    }
    UsageResult::new(upload, download)
}

fn sum_points(points: &[TrafficPoint]) -> (u64, u64) {
    points.iter().fold((0u64, 0u64), |(up, down), point| {
        match point.normalized() {
            Some((u, d)) => (up.saturating_add(u), down.saturating_add(d)),
            None => {
                tracing::warn!(
                    subscription_id = point.subscription_id,
                    period_hour = %point.period_hour,
                    upload = point.upload,
                    download = point.download,
                    "skipping traffic point with negative counter"
                );
                (up, down)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ResourceRef;
    use chrono::{TimeZone, Utc};

    const MIB: u64 = 1024 * 1024;

    fn point(hour: u32, upload: i64, download: i64) -> TrafficPoint {
        TrafficPoint {
            subscription_id: 5,
            resource: Some(ResourceRef::node(1)),
            period_hour: Utc.with_ymd_and_hms(2025, 10, 20, hour, 0, 0).unwrap(),
            upload,
            download,
        }
    }

    #[test]
    fn test_merges_both_layers() {
        let points = vec![
            point(0, (100 * MIB) as i64, (100 * MIB) as i64),
            point(1, (12 * MIB) as i64, (12 * MIB) as i64),
        ];
        let hist = HistoricalAggregate {
            upload: 400 * MIB,
            download: 400 * MIB,
            total: 800 * MIB,
        };
        let usage = aggregate_usage(&points, Some(&hist));
        assert_eq!(usage.upload, 512 * MIB);
        assert_eq!(usage.download, 512 * MIB);
        assert_eq!(usage.total, 1024 * MIB);
    }

    #[test]
    fn test_ignores_stored_historical_total() {
        let hist = HistoricalAggregate {
            upload: 10,
            download: 20,
            total: 999,
        };
        assert_eq!(aggregate_usage(&[], Some(&hist)).total, 30);
    }

    #[test]
    fn test_idempotent_and_commutative() {
        let p1 = point(0, 10, 20);
        let p2 = point(1, 30, 40);
        let hist = HistoricalAggregate {
            upload: 1,
            download: 2,
            total: 3,
        };
        let forward = vec![p1.clone(), p2.clone()];
        let backward = vec![p2, p1];

        let first = aggregate_usage(&forward, Some(&hist));
        let second = aggregate_usage(&forward, Some(&hist));
        assert_eq!(first, second);
        assert_eq!(first, aggregate_usage(&backward, Some(&hist)));
        assert_eq!(forward.len(), 2);
    }

    #[test]
    fn test_skips_negative_points() {
        let points = vec![point(0, 10, 10), point(1, -5, 100), point(2, 1, 1)];
        let usage = aggregate_usage(&points, None);
        assert_eq!(usage.upload, 11);
        assert_eq!(usage.download, 11);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let points = vec![point(0, i64::MAX, 0), point(1, i64::MAX, 0), point(2, i64::MAX, 0)];
        let hist = HistoricalAggregate {
            upload: u64::MAX,
            download: u64::MAX,
            total: u64::MAX,
        };
        let usage = aggregate_usage(&points, Some(&hist));
        assert_eq!(usage.upload, u64::MAX);
        assert_eq!(usage.total, u64::MAX);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(aggregate_usage(&[], None), UsageResult::default());
    }
}
