use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// BusinessCalendar は業務タイムゾーンでの日付・月・時間境界を計算する。
///
/// タイムゾーンはプロセス全体のグローバル設定ではなく、生成時に明示的に渡す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    tz: Tz,
}

impl BusinessCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: chrono_tz::UTC }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// at を含む業務日の開始時刻。
    pub fn start_of_day(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.with_timezone(&self.tz).date_naive();
        self.local_midnight(date)
    }

    /// at の前日（業務日）の開始時刻。スピードレイヤーとバッチレイヤーの境界に使う。
    pub fn start_of_yesterday(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let today = at.with_timezone(&self.tz).date_naive();
        let yesterday = today.pred_opt().unwrap_or(today);
        self.local_midnight(yesterday)
    }

    /// at を含む業務月の [月初, 翌月初)。
    pub fn month_bounds(&self, at: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let local = at.with_timezone(&self.tz);
        let (year, month) = (local.year(), local.month());
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some((self.local_midnight(first), self.local_midnight(next_first)))
    }

    /// at を含む1時間バケットの開始時刻。
    ///
    /// 業務タイムゾーンの正時に揃えるため、30分オフセットの地域でも日付境界とずれない。
    pub fn hour_bucket(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let offset = i64::from(at.with_timezone(&self.tz).offset().fix().local_minus_utc());
        let secs = at.timestamp();
        let rem = (secs + offset).rem_euclid(3600);
        DateTime::from_timestamp(secs - rem, 0).unwrap_or(at)
    }

    /// [from, to) に重なる全ての1時間バケット開始時刻。
    pub fn hour_buckets(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let mut buckets = Vec::new();
        let mut cursor = self.hour_bucket(from);
        while cursor < to {
            buckets.push(cursor);
            cursor += chrono::Duration::hours(1);
        }
        buckets
    }

    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.resolve_local(date.and_time(NaiveTime::MIN))
    }

    /// ローカル時刻を UTC に変換する。夏時間で曖昧な場合は早い方、
    /// 存在しない場合（ギャップ）は1時間後を採用する。
    fn resolve_local(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(naive + chrono::Duration::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self::utc()
    }
}
