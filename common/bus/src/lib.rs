use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use prometheus::{IntCounter, IntCounterVec, Registry};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, Headers, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("message payload was not valid UTF-8")]
    InvalidPayload,
    #[error("handler failed: {0}")]
    Handler(String),
}

/// A single bus message handed to a consumer's handler.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub key: Option<String>,
    pub value: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Per-message handler invoked by `run_consumer`. Returning `Err` causes a
/// retry per the configured policy; exhausting retries forwards the message
/// to the DLQ topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: BusMessage) -> Result<(), BusError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: StdDuration::from_millis(200) }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub worker_count: usize,
    pub dlq_topic: String,
    pub retry: RetryPolicy,
}

/// The schema published to `{prefix}-dlq` once a message exhausts retries.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLetter {
    pub original_topic: String,
    pub original_key: Option<String>,
    pub payload_json: serde_json::Value,
    pub error_message: String,
    pub retry_count: u32,
    pub failed_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct BusMetrics {
    pub processed_total: IntCounterVec,
    pub retried_total: IntCounterVec,
    pub dlq_total: IntCounterVec,
    pub failed_total: IntCounterVec,
}

impl BusMetrics {
    pub fn new(registry: &Registry) -> Self {
        let processed_total = IntCounterVec::new(
            prometheus::Opts::new("bus_messages_processed_total", "Messages committed after a successful handler"),
            &["topic"],
        )
        .unwrap();
        let retried_total = IntCounterVec::new(
            prometheus::Opts::new("bus_messages_retried_total", "Handler retries issued"),
            &["topic"],
        )
        .unwrap();
        let dlq_total = IntCounterVec::new(
            prometheus::Opts::new("bus_messages_dlq_total", "Messages forwarded to the DLQ"),
            &["topic"],
        )
        .unwrap();
        let failed_total = IntCounterVec::new(
            prometheus::Opts::new("bus_messages_failed_total", "Messages that failed outright (DLQ publish failure)"),
            &["topic"],
        )
        .unwrap();
        for metric in [&processed_total, &retried_total, &dlq_total, &failed_total] {
            let _ = registry.register(Box::new(metric.clone()));
        }
        Self { processed_total, retried_total, dlq_total, failed_total }
    }
}

/// Keyed Kafka-compatible producer used by the outbox relay and workers that
/// emit further events.
#[derive(Clone)]
pub struct Producer {
    inner: FutureProducer,
}

impl Producer {
    pub fn new(brokers: &str) -> Result<Self, BusError> {
        let inner: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "10000")
        .create()?;
        Ok(Self { inner })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        headers: &[(&str, &str)],
    ) -> Result<(), BusError> {
        let mut owned_headers = OwnedHeaders::new();
        for (name, value) in headers {
            owned_headers = owned_headers.insert(Header { key: name, value: Some(*value) });
        }
        let record = FutureRecord::to(topic).key(key).payload(payload).headers(owned_headers);
        self.inner
        .send(record, StdDuration::from_secs(5))
        .await
        .map_err(|(err, _)| BusError::Kafka(err))?;
        Ok(())
    }
}

/// Consumes `config.topic` with `config.worker_count` concurrent handler
/// invocations per the bounded-concurrency contract in Runs
/// until `cancel` is triggered.
pub async fn run_consumer(
    config: ConsumerConfig,
    producer: Producer,
    handler: Arc<dyn MessageHandler>,
    metrics: BusMetrics,
    cancel: CancellationToken,
) -> Result<(), BusError> {
    let consumer: StreamConsumer = ClientConfig::new()
    .set("bootstrap.servers", &config.brokers)
    .set("group.id", &config.group_id)
    .set("enable.auto.commit", "false")
    .set("auto.offset.reset", "earliest")
    .create()?;
    consumer.subscribe(&[config.topic.as_str()])?;

    let semaphore = Arc::new(Semaphore::new(config.worker_count.max(1)));
    let mut stream = consumer.stream();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(topic = %config.topic, "consumer shutting down");
                return Ok(());
            }
            next = stream.next() => {
                let Some(message) = next else { return Ok(()) };
                let borrowed = match message {
                    Ok(m) => m,
                    Err(err) => {
                        tracing::error!(topic = %config.topic, error = %err, "kafka stream error");
                        continue;
                    }
                };

                let bus_message = BusMessage {
                    topic: borrowed.topic().to_string(),
                    key: borrowed.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                    value: borrowed.payload().unwrap_or_default().to_vec(),
                    partition: borrowed.partition(),
                    offset: borrowed.offset(),
                };

                let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                let handler = handler.clone();
                let producer = producer.clone();
                let config = config.clone();
                let metrics = metrics.clone();
                let owned_consumer_topic_partition = (bus_message.topic.clone(), bus_message.partition, bus_message.offset);

                tokio::spawn(async move {
                    let _permit = permit;
                    process_with_retry(bus_message, handler, producer, config, metrics).await;
                    let _ = owned_consumer_topic_partition;
                });

                // Offsets are committed synchronously here (not inside the
                // spawned task) so redelivery on crash only ever repeats
                // work the handler must already tolerate idempotently.
                if let Err(err) = consumer.store_offset_from_message(&borrowed) {
                    tracing::warn!(error = %err, "failed to store kafka offset");
                }
            }
        }
    }
}

async fn process_with_retry(
    message: BusMessage,
    handler: Arc<dyn MessageHandler>,
    producer: Producer,
    config: ConsumerConfig,
    metrics: BusMetrics,
) {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match handler.handle(message.clone()).await {
            Ok(()) => {
                metrics.processed_total.with_label_values(&[&message.topic]).inc();
                return;
            }
            Err(err) if attempt < config.retry.max_attempts => {
                metrics.retried_total.with_label_values(&[&message.topic]).inc();
                tracing::warn!(topic = %message.topic, attempt, error = %err, "handler failed, retrying");
                tokio::time::sleep(config.retry.base_delay * attempt).await;
            }
            Err(err) => {
                tracing::error!(topic = %message.topic, attempt, error = %err, "handler exhausted retries, sending to dlq");
                let dead_letter = DeadLetter {
                    original_topic: message.topic.clone(),
                    original_key: message.key.clone(),
                    payload_json: serde_json::from_slice(&message.value)
                    .unwrap_or_else(|_| serde_json::json!({ "raw_base64": base64_encode(&message.value) })),
                    error_message: err.to_string(),
                    retry_count: attempt,
                    failed_at: Utc::now(),
                };
                let payload = serde_json::to_vec(&dead_letter).expect("dead letter serializes");
                let key = message.key.clone().unwrap_or_default();
                if let Err(publish_err) = producer.publish(&config.dlq_topic, &key, &payload, &[]).await {
                    metrics.failed_total.with_label_values(&[&message.topic]).inc();
                    tracing::error!(error = %publish_err, "failed to publish to dlq");
                } else {
                    metrics.dlq_total.with_label_values(&[&message.topic]).inc();
                }
                return;
            }
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}

pub fn health_counter(name: &'static str, help: &'static str) -> IntCounter {
    IntCounter::new(name, help).expect("valid metric name")
}

