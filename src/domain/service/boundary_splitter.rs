use chrono::{DateTime, Utc};

use crate::domain::entity::{AccountingPeriod, TimeRange};
use crate::domain::service::BusinessCalendar;

/// SplitRanges は集計期間をバッチレイヤー担当とスピードレイヤー担当に分割した結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitRanges {
    /// 前日の業務日開始時刻。これより前はバッチレイヤーが確定値を持つ。
    pub cutover: DateTime<Utc>,
    pub historical: Option<TimeRange>,
    pub recent: Option<TimeRange>,
}

/// 期間 [start, min(end, now)) を cutover で重複なく分割する。
///
/// バッチレイヤーは「昨日より前」の完結した日のみを持ち、
/// 昨日と今日はスピードレイヤー（保持期間 48h 以上）が担当する。
pub fn split_period(
    period: &AccountingPeriod,
    now: DateTime<Utc>,
    calendar: &BusinessCalendar,
) -> SplitRanges {
    let cutover = calendar.start_of_yesterday(now);
    let effective_end = period.end.min(now);

    let historical = TimeRange::new(period.start, cutover.min(effective_end));
    let recent = TimeRange::new(period.start.max(cutover), effective_end);

    SplitRanges {
        cutover,
        historical,
        recent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> AccountingPeriod {
        AccountingPeriod::new(start, end).unwrap()
    }

    fn assert_exact_cover(p: &AccountingPeriod, now: DateTime<Utc>, split: &SplitRanges) {
        let expected_end = p.end.min(now);
        match (split.historical, split.recent) {
            (Some(h), Some(r)) => {
                assert!(!h.overlaps(&r));
                assert_eq!(h.start, p.start);
                assert_eq!(h.end, r.start);
                assert_eq!(r.end, expected_end);
            }
            (Some(h), None) => {
                assert_eq!(h.start, p.start);
                assert_eq!(h.end, expected_end);
            }
            (None, Some(r)) => {
                assert_eq!(r.start, p.start);
                assert_eq!(r.end, expected_end);
            }
            (None, None) => assert!(p.start >= expected_end),
        }
    }

    #[test]
    fn test_scenario_calendar_month_mid_month() {
        let p = period(utc(2025, 10, 1, 0), utc(2025, 11, 1, 0));
        let now = utc(2025, 10, 21, 15);
        let split = split_period(&p, now, &BusinessCalendar::utc());

        assert_eq!(split.cutover, utc(2025, 10, 20, 0));
        assert_eq!(
            split.historical,
            TimeRange::new(utc(2025, 10, 1, 0), utc(2025, 10, 20, 0))
        );
        assert_eq!(split.recent, TimeRange::new(utc(2025, 10, 20, 0), now));
    }

    #[test]
    fn test_period_started_after_cutover_is_recent_only() {
        let p = period(utc(2025, 10, 21, 3), utc(2025, 11, 21, 3));
        let now = utc(2025, 10, 21, 15);
        let split = split_period(&p, now, &BusinessCalendar::utc());
        assert!(split.historical.is_none());
        assert_eq!(split.recent, TimeRange::new(utc(2025, 10, 21, 3), now));
    }

    #[test]
    fn test_period_ended_before_cutover_is_historical_only() {
        let p = period(utc(2025, 9, 1, 0), utc(2025, 10, 1, 0));
        let now = utc(2025, 10, 21, 15);
        let split = split_period(&p, now, &BusinessCalendar::utc());
        assert_eq!(
            split.historical,
            TimeRange::new(utc(2025, 9, 1, 0), utc(2025, 10, 1, 0))
        );
        assert!(split.recent.is_none());
    }

    #[test]
    fn test_first_day_of_month() {
        // 月初は昨日が前月に属するため全てスピードレイヤー
        let p = period(utc(2025, 11, 1, 0), utc(2025, 12, 1, 0));
        let now = utc(2025, 11, 1, 9);
        let split = split_period(&p, now, &BusinessCalendar::utc());
        assert!(split.historical.is_none());
        assert_eq!(split.recent, TimeRange::new(utc(2025, 11, 1, 0), now));
    }

    #[test]
    fn test_future_period_is_empty() {
        let p = period(utc(2025, 11, 1, 0), utc(2025, 12, 1, 0));
        let split = split_period(&p, utc(2025, 10, 21, 15), &BusinessCalendar::utc());
        assert!(split.historical.is_none());
        assert!(split.recent.is_none());
    }

    #[test]
    fn test_cover_and_disjoint_over_grid() {
        let zones = [
            BusinessCalendar::utc(),
            BusinessCalendar::new(chrono_tz::Asia::Shanghai),
            BusinessCalendar::new(chrono_tz::America::New_York),
            BusinessCalendar::new(chrono_tz::Asia::Kolkata),
        ];
        let base = utc(2025, 10, 1, 0);
        for cal in &zones {
            for start_h in (0..24 * 40).step_by(13) {
                for len_h in [0_i64, 1, 25, 24 * 31] {
                    for now_h in (0..24 * 45).step_by(17) {
                        let start = base + chrono::Duration::hours(start_h);
                        let end = start + chrono::Duration::hours(len_h);
                        let now = base + chrono::Duration::hours(now_h);
                        let p = period(start, end);
                        let split = split_period(&p, now, cal);
                        assert_exact_cover(&p, now, &split);
                    }
                }
            }
        }
    }
}
