use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

/// Inclusive time window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(AnalyticsError::InvalidRange(format!(
                "end {} is before start {}",
                end.to_rfc3339(),
                start.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `now`, clamped to the earliest representable
    /// instant.
    pub fn last_days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            start: earlier(now, Duration::days(i64::from(days))),
            end: now,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window of equal length ending one nanosecond before this one
    /// starts. Consecutive prior windows tile time without sharing an instant.
    pub fn prior(&self) -> Self {
        let end = earlier(self.start, Duration::nanoseconds(1));
        Self {
            start: earlier(end, self.duration()),
            end,
        }
    }

    /// Position of `t` along the window as a percentage, clamped to [0, 100].
    /// Zero-length windows place everything at 0.
    pub fn position_pct(&self, t: DateTime<Utc>) -> f64 {
        let span = self.duration().num_milliseconds();
        if span <= 0 {
            return 0.0;
        }
        let offset = (t - self.start).num_milliseconds();
        (offset as f64 / span as f64 * 100.0).clamp(0.0, 100.0)
    }
}

fn earlier(t: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    t.checked_sub_signed(by).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(TimeRange::new(day(10), day(1)).is_err());
        assert!(TimeRange::new(day(1), day(1)).is_ok());
    }

    #[test]
    fn position_is_clamped() {
        let range = TimeRange::new(day(1), day(11)).unwrap();
        assert_eq!(range.position_pct(day(6)), 50.0);
        assert_eq!(range.position_pct(day(20)), 100.0);
        assert_eq!(
            range.position_pct(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            0.0
        );
    }

    #[test]
    fn zero_length_window_positions_at_zero() {
        let range = TimeRange::new(day(5), day(5)).unwrap();
        assert_eq!(range.position_pct(day(5)), 0.0);
    }

    #[test]
    fn prior_window_has_same_length() {
        let range = TimeRange::new(day(11), day(21)).unwrap();
        let prior = range.prior();
        assert_eq!(prior.duration(), range.duration());
        assert_eq!(prior.end, day(11) - Duration::nanoseconds(1));
        assert!(range.contains(day(11)));
        assert!(!range.contains(day(22)));
    }

    #[test]
    fn boundary_instant_belongs_to_one_window_only() {
        let range = TimeRange::new(day(11), day(21)).unwrap();
        let prior = range.prior();
        let older = prior.prior();
        assert!(range.contains(day(11)));
        assert!(!prior.contains(day(11)));
        assert!(prior.contains(prior.start));
        assert!(!older.contains(prior.start));
        assert_eq!(older.end + Duration::nanoseconds(1), prior.start);
    }

    #[test]
    fn huge_lookback_clamps_instead_of_panicking() {
        let range = TimeRange::last_days(day(1), u32::MAX);
        assert_eq!(range.start, DateTime::<Utc>::MIN_UTC);
        assert_eq!(range.end, day(1));
        let prior = range.prior();
        assert_eq!(prior.start, DateTime::<Utc>::MIN_UTC);
    }
}
