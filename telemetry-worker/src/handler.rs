use async_trait::async_trait;
use chrono::Utc;
use common_bus::{BusError, BusMessage, MessageHandler};
use domain::PlaybackEvent;
use sqlx::PgPool;

use crate::buckets::{day_bucket, hour_bucket};
use crate::repo;

pub struct TelemetryHandler {
    pub db: PgPool,
}

#[async_trait]
impl MessageHandler for TelemetryHandler {
    async fn handle(&self, message: BusMessage) -> Result<(), BusError> {
        let event: PlaybackEvent = serde_json::from_slice(&message.value).map_err(|_| BusError::InvalidPayload)?;
        let now = Utc::now();
        let seconds_played = event.duration_played_seconds.unwrap_or(0.0);

        let mut tx = self.db.begin().await.map_err(|e| BusError::Handler(e.to_string()))?;
        repo::apply_event(
            &mut tx,
            &event.track_id,
            &event.user_id,
            hour_bucket(event.server_timestamp),
            day_bucket(event.server_timestamp),
            event.event_type,
            seconds_played,
            event.client_timestamp,
            now,
        )
        .await
        .map_err(|e| BusError::Handler(e.to_string()))?;
        tx.commit().await.map_err(|e| BusError::Handler(e.to_string()))?;

        Ok(())
    }
}

