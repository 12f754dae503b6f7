/// KST（UTC+09:00）基準の日付ユーティリティ。
///
/// フィードサービスの `forDate` と期間指定はすべて韓国時間の暦日で扱う。
use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

pub const KST_OFFSET_SECS: i32 = 9 * 3600;
const SECONDS_PER_DAY: i64 = 86_400;

/// `yyyy-mm-dd` 形式。
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[must_use]
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).expect("valid KST offset")
}

/// `yyyy-mm-dd` 文字列を暦日にパースする。
///
/// # Errors
/// 形式が不正な場合はエラーを返す。
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date (expected yyyy-mm-dd): {raw}"))
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// KST の 00:00:00 を Unix 秒で返す。
#[must_use]
pub fn start_of_day_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() - i64::from(KST_OFFSET_SECS)
}

/// KST の 23:59:59 を Unix 秒で返す（両端を含む区間の終端）。
#[must_use]
pub fn end_of_day_epoch(date: NaiveDate) -> i64 {
    start_of_day_epoch(date) + SECONDS_PER_DAY - 1
}

/// Unix 秒を KST の暦日に変換する。範囲外の値は `None`。
#[must_use]
pub fn date_from_epoch(seconds: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|utc| utc.with_timezone(&kst()).date_naive())
}

#[must_use]
pub fn today_kst(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&kst()).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> NaiveDate {
        parse_date(raw).expect("valid date")
    }

    #[test]
    fn day_bounds_are_inclusive_kst() {
        let day = date("2025-03-01");

        // 2025-03-01T00:00:00+09:00 == 2025-02-28T15:00:00Z
        assert_eq!(start_of_day_epoch(day), 1_740_754_800);
        assert_eq!(end_of_day_epoch(day), 1_740_754_800 + 86_399);
    }

    #[test]
    fn epoch_maps_to_kst_calendar_day() {
        // 2025-02-28T15:30:00Z is already March 1st in Seoul.
        assert_eq!(date_from_epoch(1_740_756_600), Some(date("2025-03-01")));
        // 2025-02-28T14:59:59Z is still February 28th.
        assert_eq!(date_from_epoch(1_740_754_799), Some(date("2025-02-28")));
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("2025/03/01").is_err());
        assert!(parse_date("20250301").is_err());
        assert_eq!(format_date(date(" 2025-03-01 ")), "2025-03-01");
    }

    #[test]
    fn today_uses_seoul_calendar() {
        let now = DateTime::parse_from_rfc3339("2025-05-31T16:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(today_kst(now), date("2025-06-01"));
    }
}
