use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `TrackHourlyAggregate`. Keyed by `(track_id, hour_bucket)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackHourlyAggregate {
    pub track_id: String,
    pub hour_bucket: DateTime<Utc>,
    pub play_count: i64,
    pub completed_play_count: i64,
    pub total_seconds_played: f64,
    pub updated_at: DateTime<Utc>,
}

/// `TrackDailyAggregate`. Keyed by `(track_id, day_bucket)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDailyAggregate {
    pub track_id: String,
    pub day_bucket: DateTime<Utc>,
    pub play_count: i64,
    pub completed_play_count: i64,
    pub total_seconds_played: f64,
    pub unique_listener_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// `UserActivityAggregate`. Keyed by `(user_id, day_bucket)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityAggregate {
    pub user_id: String,
    pub day_bucket: DateTime<Utc>,
    pub play_count: i64,
    pub total_seconds_played: f64,
    pub last_active_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single play/pause/stop telemetry event, durably queued through the
/// outbox before these aggregates are rolled up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackEventType {
    Started,
    Progress,
    Completed,
    Abandoned,
}

impl TrackHourlyAggregate {
    pub fn empty(track_id: String, hour_bucket: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { track_id, hour_bucket, play_count: 0, completed_play_count: 0, total_seconds_played: 0.0, updated_at: now }
    }

    /// Commutative merge: counters add, `updated_at` takes the max
    /// ( "aggregate updates must be commutative and
    /// idempotent under at-least-once delivery").
    pub fn apply(&mut self, event_type: PlaybackEventType, seconds_played: f64, now: DateTime<Utc>) {
        self.play_count += 1;
        if event_type == PlaybackEventType::Completed {
            self.completed_play_count += 1;
        }
        self.total_seconds_played += seconds_played;
        self.updated_at = self.updated_at.max(now);
    }
}

impl TrackDailyAggregate {
    pub fn empty(track_id: String, day_bucket: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            track_id,
            day_bucket,
            play_count: 0,
            completed_play_count: 0,
            total_seconds_played: 0.0,
            unique_listener_count: 0,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, event_type: PlaybackEventType, seconds_played: f64, is_new_listener: bool, now: DateTime<Utc>) {
        self.play_count += 1;
        if event_type == PlaybackEventType::Completed {
            self.completed_play_count += 1;
        }
        self.total_seconds_played += seconds_played;
        if is_new_listener {
            self.unique_listener_count += 1;
        }
        self.updated_at = self.updated_at.max(now);
    }
}

impl UserActivityAggregate {
    pub fn empty(user_id: String, day_bucket: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { user_id, day_bucket, play_count: 0, total_seconds_played: 0.0, last_active_at: now, updated_at: now }
    }

    pub fn apply(&mut self, seconds_played: f64, event_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.play_count += 1;
        self.total_seconds_played += seconds_played;
        self.last_active_at = self.last_active_at.max(event_at);
        self.updated_at = self.updated_at.max(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_apply_is_commutative_under_reordering() {
        let now = Utc::now();
        let bucket = now;
        let mut a = TrackHourlyAggregate::empty("t1".into(), bucket, now);
        let mut b = TrackHourlyAggregate::empty("t1".into(), bucket, now);

        a.apply(PlaybackEventType::Started, 30.0, now);
        a.apply(PlaybackEventType::Completed, 180.0, now + chrono::Duration::seconds(5));

        b.apply(PlaybackEventType::Completed, 180.0, now + chrono::Duration::seconds(5));
        b.apply(PlaybackEventType::Started, 30.0, now);

        assert_eq!(a.play_count, b.play_count);
        assert_eq!(a.completed_play_count, b.completed_play_count);
        assert_eq!(a.total_seconds_played, b.total_seconds_played);
        assert_eq!(a.updated_at, b.updated_at);
    }

    #[test]
    fn user_activity_last_active_takes_max_timestamp() {
        let now = Utc::now();
        let mut agg = UserActivityAggregate::empty("u1".into(), now, now);
        agg.apply(60.0, now - chrono::Duration::hours(1), now);
        agg.apply(60.0, now + chrono::Duration::hours(1), now);
        assert_eq!(agg.last_active_at, now + chrono::Duration::hours(1));
    }
}

