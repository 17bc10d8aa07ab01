//! Per-key daily request limits.
//!
//! A key's allowance resets at midnight UTC, whatever the server's local time
//! zone. Operators east or west of UTC see the reset at their local
//! equivalent of 00:00 UTC. The limit that applies depends on whether today
//! (in UTC) is a weekday (Monday to Friday) or a weekend day. Only requests
//! timestamped on today's UTC calendar date count; this is not a rolling 24
//! hour window.

use chrono::{Datelike, NaiveDate};
use fxgate_common::{ConversionRecord, SharedClock, Timestamp};

use crate::config::RateLimitConfig;

/// Outcome of a limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Date the check was made for.
    pub today: NaiveDate,
    /// Whether today is Saturday or Sunday.
    pub is_weekend: bool,
    /// Past requests on `today`.
    pub count: usize,
    /// Limit that applies today.
    pub limit: u32,
    /// Whether the count is over the limit.
    pub exceeded: bool,
}

/// True for Saturday and Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    // 0 = Monday .. 6 = Sunday
    date.weekday().num_days_from_monday() >= 5
}

/// Count timestamps falling on `today`.
pub fn count_on<I>(today: NaiveDate, timestamps: I) -> usize
where
    I: IntoIterator<Item = Timestamp>,
{
    timestamps
        .into_iter()
        .filter(|ts| ts.date_naive() == today)
        .count()
}

/// Decide whether the history for `today` is over the applicable limit.
///
/// The comparison is strictly greater-than: a history holding exactly
/// `limit` records for today is still allowed.
pub fn evaluate<I>(today: NaiveDate, timestamps: I, weekday_limit: u32, weekend_limit: u32) -> RateLimitDecision
where
    I: IntoIterator<Item = Timestamp>,
{
    let count = count_on(today, timestamps);
    let is_weekend = is_weekend(today);
    let limit = if is_weekend { weekend_limit } else { weekday_limit };

    RateLimitDecision {
        today,
        is_weekend,
        count,
        limit,
        exceeded: count > limit as usize,
    }
}

/// Read-only limiter over a caller's conversion history.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a limiter with the given thresholds.
    pub fn new(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self { config, clock }
    }

    /// Evaluate `history` against today's limit.
    pub fn check(&self, history: &[ConversionRecord]) -> RateLimitDecision {
        evaluate(
            self.clock.today(),
            history.iter().map(|r| r.timestamp),
            self.config.weekday_limit,
            self.config.weekend_limit,
        )
    }

    /// Shorthand for `check(history).exceeded`.
    pub fn is_exceeded(&self, history: &[ConversionRecord]) -> bool {
        self.check(history).exceeded
    }

    /// Configured thresholds.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone, Utc};
    use fxgate_common::{ApiKey, Currency, ManualClock};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    // 2024-03-05 is a Tuesday, 2024-03-09 a Saturday.
    fn tuesday() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
    }

    fn saturday() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
    }

    fn record_at(ts: Timestamp) -> ConversionRecord {
        ConversionRecord::new(
            ApiKey::new("key"),
            Currency::usd(),
            Currency::eur(),
            dec!(1),
            dec!(0.92),
            "{}".to_string(),
            ts,
        )
    }

    fn history(n: usize, at: Timestamp) -> Vec<ConversionRecord> {
        (0..n)
            .map(|i| record_at(at - Duration::minutes(i as i64)))
            .collect()
    }

    fn limiter_at(now: Timestamp, weekday_limit: u32, weekend_limit: u32) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                weekday_limit,
                weekend_limit,
            },
            Arc::new(ManualClock::new(now)),
        )
    }

    #[test]
    fn test_weekday_boundary() {
        let limiter = limiter_at(tuesday(), 5, 2);

        assert!(!limiter.is_exceeded(&history(4, tuesday())));
        assert!(!limiter.is_exceeded(&history(5, tuesday())));
        assert!(limiter.is_exceeded(&history(6, tuesday())));
    }

    #[test]
    fn test_weekend_uses_weekend_limit() {
        let limiter = limiter_at(saturday(), 5, 2);

        let decision = limiter.check(&history(3, saturday()));

        assert!(decision.is_weekend);
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.count, 3);
        assert!(decision.exceeded);

        assert!(!limiter.is_exceeded(&history(2, saturday())));
    }

    #[test]
    fn test_same_count_differs_by_day_type() {
        let records_tue = history(3, tuesday());
        let records_sat = history(3, saturday());

        assert!(!limiter_at(tuesday(), 5, 2).is_exceeded(&records_tue));
        assert!(limiter_at(saturday(), 5, 2).is_exceeded(&records_sat));
    }

    #[test]
    fn test_other_days_are_ignored() {
        let limiter = limiter_at(tuesday(), 1, 1);
        let yesterday = tuesday() - Duration::days(1);
        let tomorrow = tuesday() + Duration::days(1);

        let mut records = history(50, yesterday);
        records.extend(history(50, tomorrow));
        records.push(record_at(tuesday()));

        let decision = limiter.check(&records);
        assert_eq!(decision.count, 1);
        assert!(!decision.exceeded);
    }

    #[test]
    fn test_calendar_day_not_rolling_window() {
        // 23:59 on Monday is 1 minute before Tuesday 00:00 but not "today".
        let midnight = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let limiter = limiter_at(midnight, 0, 0);

        let records = vec![record_at(midnight - Duration::minutes(1))];

        assert!(!limiter.is_exceeded(&records));
        assert!(limiter.is_exceeded(&[record_at(midnight)]));
    }

    #[test]
    fn test_day_boundary_is_utc_not_local() {
        // 01:00 on Tuesday at UTC+5 is still Monday in UTC.
        let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
        let local_tuesday = plus_five.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap();
        let limiter = limiter_at(tuesday(), 0, 0);

        let records = vec![record_at(local_tuesday.with_timezone(&Utc))];

        let decision = limiter.check(&records);
        assert_eq!(decision.today, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(decision.count, 0);
        assert!(!decision.exceeded);
    }

    #[test]
    fn test_empty_history_is_allowed_with_zero_limit() {
        let limiter = limiter_at(tuesday(), 0, 0);
        assert!(!limiter.is_exceeded(&[]));
    }

    #[test]
    fn test_weekday_classification() {
        for day in 4..=8 {
            // 2024-03-04 (Mon) .. 2024-03-08 (Fri)
            assert!(!is_weekend(NaiveDate::from_ymd_opt(2024, 3, day).unwrap()));
        }
        assert!(is_weekend(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        assert!(is_weekend(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
    }

    proptest! {
        #[test]
        fn prop_exceeded_iff_count_over_limit(
            today_count in 0usize..40,
            other_count in 0usize..40,
            weekday_limit in 0u32..30,
            weekend_limit in 0u32..30,
            day_offset in 0i64..7,
        ) {
            let now = tuesday() + Duration::days(day_offset);
            let today = now.date_naive();
            let mut stamps: Vec<Timestamp> = (0..today_count)
                .map(|i| now - Duration::seconds(i as i64))
                .collect();
            stamps.extend((0..other_count).map(|i| now - Duration::days(1 + i as i64 % 5)));

            let decision = evaluate(today, stamps, weekday_limit, weekend_limit);
            let limit = if is_weekend(today) { weekend_limit } else { weekday_limit };

            prop_assert_eq!(decision.count, today_count);
            prop_assert_eq!(decision.limit, limit);
            prop_assert_eq!(decision.exceeded, today_count > limit as usize);
        }
    }
}
