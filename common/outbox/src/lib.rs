use std::time::Duration;

use chrono::{DateTime, Utc};
use common_bus::Producer;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

/// A message persisted atomically with a domain change and relayed to the
/// bus asynchronously.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: String,
    pub message_type: String,
    pub topic: String,
    pub partition_key: Option<String>,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub error_message: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(
        message_type: impl Into<String>,
        topic: impl Into<String>,
        partition_key: Option<String>,
        payload: serde_json::Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            message_type: message_type.into(),
            topic: topic.into(),
            partition_key,
            payload,
            correlation_id: correlation_id.into(),
            created_at: Utc::now(),
            status: OutboxStatus::Pending,
            attempts: 0,
            error_message: None,
            published_at: None,
        }
    }

    /// Inserts the row as part of the caller's transaction, so it commits
    /// atomically with the domain change it describes.
    pub async fn insert(&self, tx: &mut sqlx::Transaction<'_, sqlx::Postgres>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO outbox_messages \
            (id, message_type, topic, partition_key, payload, correlation_id, created_at, status, attempts) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'Pending', 0)",
        )
        .bind(&self.id)
        .bind(&self.message_type)
        .bind(&self.topic)
        .bind(&self.partition_key)
        .bind(&self.payload)
        .bind(&self.correlation_id)
        .bind(self.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub batch_size: i64,
    pub max_attempts: i32,
    pub poll_interval: Duration,
}

/// Runs the outbox relay: continuously scans `Pending` rows in `createdAt`
/// order and publishes them to the bus, preserving per-partition-key order.
/// At most one instance should run per deployment.
pub async fn run_relay(pool: PgPool, producer: Producer, config: RelayConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("outbox relay shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = relay_once(&pool, &producer, &config).await {
                    tracing::error!(error = %err, "outbox relay batch failed");
                }
            }
        }
    }
}

async fn relay_once(pool: &PgPool, producer: &Producer, config: &RelayConfig) -> Result<(), sqlx::Error> {
    let rows: Vec<OutboxMessage> = sqlx::query_as(
        "SELECT id, message_type, topic, partition_key, payload, correlation_id, created_at, \
        status, attempts, error_message, published_at \
        FROM outbox_messages WHERE status = 'Pending' ORDER BY created_at ASC LIMIT $1",
    )
    .bind(config.batch_size)
    .fetch_all(pool)
    .await?;

    for row in rows {
        let key = row.partition_key.clone().unwrap_or_default();
        let payload = serde_json::to_vec(&row.payload).unwrap_or_default();
        let headers = [("correlationId", row.correlation_id.as_str()), ("schemaVersion", "1")];

        match producer.publish(&row.topic, &key, &payload, &headers).await {
            Ok(()) => {
                sqlx::query("UPDATE outbox_messages SET status = 'Published', published_at = now() WHERE id = $1")
                .bind(&row.id)
                .execute(pool)
                .await?;
            }
            Err(err) => {
                let attempts = row.attempts + 1;
                let new_status = if attempts >= config.max_attempts { "Failed" } else { "Pending" };
                tracing::warn!(outbox_id = %row.id, attempts, error = %err, "outbox publish failed");
                sqlx::query("UPDATE outbox_messages SET status = $2, attempts = $3, error_message = $4 WHERE id = $1")
                .bind(&row.id)
                .bind(new_status)
                .bind(attempts)
                .bind(err.to_string())
                .execute(pool)
                .await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_starts_pending_with_zero_attempts() {
        let msg = OutboxMessage::new("AudioUploaded", "dev-audio-events", Some("user-1".into()), serde_json::json!({}), "corr-1");
        assert_eq!(msg.status, OutboxStatus::Pending);
        assert_eq!(msg.attempts, 0);
        assert!(msg.published_at.is_none());
    }
}

