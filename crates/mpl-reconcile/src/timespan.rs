//! Round Timespan Policy.
//!
//! A round's window is the 7-day calendar week that starts at local midnight
//! of the most recent anchor weekday on or before the round's start date.
//! A kickoff belongs to the round iff `window.start <= kickoff < window.end`.
//!
//! Pure: the window is derived from the round start on every call, never
//! cached, because round starts move during reconciliation.

use anyhow::{anyhow, Result};
use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;

pub const WINDOW_DAYS: i64 = 7;

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RoundWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundTimespanPolicy {
    anchor: Weekday,
    tz: Tz,
}

impl Default for RoundTimespanPolicy {
    fn default() -> Self {
        Self {
            anchor: Weekday::Wed,
            tz: Tz::UTC,
        }
    }
}

impl RoundTimespanPolicy {
    pub fn new(anchor: Weekday, tz: Tz) -> Self {
        Self { anchor, tz }
    }

    /// Build from config strings (`"wednesday"` / `"Wed"`, `"Europe/London"`).
    pub fn from_names(anchor: &str, tz: &str) -> Result<Self> {
        let anchor = anchor
            .trim()
            .parse::<Weekday>()
            .map_err(|_| anyhow!("invalid anchor weekday '{}'", anchor))?;
        let tz = tz
            .trim()
            .parse::<Tz>()
            .map_err(|_| anyhow!("invalid window timezone '{}'", tz))?;
        Ok(Self { anchor, tz })
    }

    pub fn anchor(&self) -> Weekday {
        self.anchor
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn window_for(&self, round_start: DateTime<Utc>) -> RoundWindow {
        let local_date = round_start.with_timezone(&self.tz).date_naive();
        let back = (local_date.weekday().num_days_from_monday() + 7
            - self.anchor.num_days_from_monday())
            % 7;
        let start_date = local_date - Duration::days(i64::from(back));
        let end_date = start_date + Duration::days(WINDOW_DAYS);
        RoundWindow {
            start: self.local_midnight(start_date),
            end: self.local_midnight(end_date),
        }
    }

    pub fn belongs_to_round_window(
        &self,
        kickoff: DateTime<Utc>,
        round_start: DateTime<Utc>,
    ) -> bool {
        self.window_for(round_start).contains(kickoff)
    }

    /// Midnight that DST skips resolves to the first valid instant of the day;
    /// an ambiguous one to the earlier instant.
    fn local_midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        match self.tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => t.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => (1..=3)
                .filter_map(|h| {
                    self.tz
                        .from_local_datetime(&(naive + Duration::hours(h)))
                        .earliest()
                })
                .next()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn saturday_start_anchors_on_preceding_wednesday() {
        // 2024-08-17 is a Saturday.
        let w = RoundTimespanPolicy::default().window_for(utc("2024-08-17T14:00:00Z"));
        assert_eq!(w.start, utc("2024-08-14T00:00:00Z"));
        assert_eq!(w.end, utc("2024-08-21T00:00:00Z"));
    }

    #[test]
    fn wednesday_start_anchors_on_itself() {
        let w = RoundTimespanPolicy::default().window_for(utc("2024-08-21T18:45:00Z"));
        assert_eq!(w.start, utc("2024-08-21T00:00:00Z"));
    }

    #[test]
    fn tuesday_start_belongs_to_week_that_began_six_days_earlier() {
        let w = RoundTimespanPolicy::default().window_for(utc("2024-08-20T19:00:00Z"));
        assert_eq!(w.start, utc("2024-08-14T00:00:00Z"));
    }

    #[test]
    fn window_end_is_exclusive() {
        let p = RoundTimespanPolicy::default();
        let start = utc("2024-08-17T14:00:00Z");
        assert!(p.belongs_to_round_window(utc("2024-08-14T00:00:00Z"), start));
        assert!(p.belongs_to_round_window(utc("2024-08-20T23:59:59Z"), start));
        assert!(!p.belongs_to_round_window(utc("2024-08-21T00:00:00Z"), start));
        assert!(!p.belongs_to_round_window(utc("2024-08-13T23:59:59Z"), start));
    }

    #[test]
    fn custom_anchor_changes_week_boundary() {
        let p = RoundTimespanPolicy::new(Weekday::Mon, Tz::UTC);
        let w = p.window_for(utc("2024-08-17T14:00:00Z"));
        assert_eq!(w.start, utc("2024-08-12T00:00:00Z"));
        assert_eq!(w.end, utc("2024-08-19T00:00:00Z"));
    }

    #[test]
    fn window_is_counted_in_configured_zone() {
        // 23:30 UTC Tuesday is already Wednesday in Berlin (UTC+2 in August).
        let p = RoundTimespanPolicy::from_names("wednesday", "Europe/Berlin").unwrap();
        let w = p.window_for(utc("2024-08-20T23:30:00Z"));
        assert_eq!(w.start, utc("2024-08-20T22:00:00Z"));
        assert_eq!(w.end, utc("2024-08-27T22:00:00Z"));
    }

    #[test]
    fn window_spanning_dst_change_is_not_exactly_seven_days() {
        // Europe/London falls back on 2024-10-27.
        let p = RoundTimespanPolicy::from_names("wed", "Europe/London").unwrap();
        let w = p.window_for(utc("2024-10-26T11:30:00Z"));
        assert_eq!(w.start, utc("2024-10-22T23:00:00Z"));
        assert_eq!(w.end, utc("2024-10-30T00:00:00Z"));
    }

    #[test]
    fn from_names_rejects_garbage() {
        assert!(RoundTimespanPolicy::from_names("someday", "UTC").is_err());
        assert!(RoundTimespanPolicy::from_names("wed", "Mars/Olympus").is_err());
    }
}
