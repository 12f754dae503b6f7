use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

/// 毎日決まった時刻（固定オフセット）に発火する周期。
#[derive(Debug, Clone)]
pub(crate) struct DailyCadence {
    tz: FixedOffset,
    target: NaiveTime,
}

impl DailyCadence {
    pub(crate) fn new(tz: FixedOffset, hour: u32, minute: u32) -> Result<Self> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid batch time: {hour:02}:{minute:02}"))?;
        Ok(Self { tz, target })
    }

    pub(crate) fn tz(&self) -> FixedOffset {
        self.tz
    }

    /// `now` 以降で最初の発火時刻。ちょうど発火時刻なら `now` を返す。
    pub(crate) fn next_run_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let localized_now = now.with_timezone(&self.tz);
        let mut date = localized_now.date_naive();
        if localized_now.time() > self.target {
            date = advance_day(date);
        }

        match self.tz.from_local_datetime(&date.and_time(self.target)) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            LocalResult::None => unreachable!("fixed offset never skips local times"),
        }
    }
}

fn advance_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt()
        .expect("date should remain representable when advancing")
}

#[cfg(test)]
mod tests {
    use super::DailyCadence;
    use crate::util::time::kst;
    use chrono::{DateTime, Utc};

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn fires_later_the_same_day_before_trigger() {
        let cadence = DailyCadence::new(kst(), 4, 0).expect("cadence");
        let now = parse_utc("2025-03-01T18:30:00Z"); // 03:30 KST on 03-02
        assert_eq!(cadence.next_run_from(now), parse_utc("2025-03-01T19:00:00Z"));
    }

    #[test]
    fn fires_next_day_after_trigger() {
        let cadence = DailyCadence::new(kst(), 4, 30).expect("cadence");
        let now = parse_utc("2025-03-01T10:00:00Z"); // 19:00 KST
        assert_eq!(cadence.next_run_from(now), parse_utc("2025-03-01T19:30:00Z"));
    }

    #[test]
    fn fires_immediately_at_exact_trigger() {
        let cadence = DailyCadence::new(kst(), 4, 0).expect("cadence");
        let now = parse_utc("2025-03-01T19:00:00Z");
        assert_eq!(cadence.next_run_from(now), now);
    }

    #[test]
    fn rejects_out_of_range_time() {
        assert!(DailyCadence::new(kst(), 24, 0).is_err());
        assert!(DailyCadence::new(kst(), 4, 60).is_err());
    }
}
