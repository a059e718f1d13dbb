use chrono::{DateTime, Timelike, Utc};

/// Truncates to the start of the containing hour (
/// `TrackHourlyAggregate.hourBucket`).
pub fn hour_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_minute(0).and_then(|t| t.with_second(0)).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

/// Truncates to the start of the containing UTC day (
/// `TrackDailyAggregate.dayBucket`, `UserActivityAggregate.dayBucket`).
pub fn day_bucket(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_hour(0).and_then(|t| t.with_minute(0)).and_then(|t| t.with_second(0)).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

