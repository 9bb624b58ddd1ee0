//! Pulse publisher and dead-letter publisher
//!
//! `PulsePublisher` drives the fixed-interval publishing loop: every tick it
//! serializes a timestamped pulse and publishes it with an incrementing,
//! publisher-owned counter as the record key. `DeadLetterPublisher` is the
//! Kafka-backed `DeadLetterSink` used by the recovery policy, plus the direct
//! route for poison payloads that never decoded.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::recovery::{dead_letter_destination, DeadLetterSink};
use super::{DeadLetterRecord, KafkaIntegrationError};
use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::models::PulseMessage;

/// Publisher for dead-letter records
pub struct DeadLetterPublisher {
    /// Kafka producer instance
    producer: FutureProducer,

    /// Dead-letter topic suffix, appended to the source topic
    suffix: String,

    /// Timeout for send operations
    send_timeout: Duration,
}

impl DeadLetterPublisher {
    /// Create a new dead-letter publisher
    pub fn new(config: ClientConfig, suffix: impl Into<String>, send_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = config
            .create()
            .map_err(|e| Error::from(KafkaIntegrationError::ConnectionError(e)))?;

        Ok(Self {
            producer,
            suffix: suffix.into(),
            send_timeout,
        })
    }

    /// Publish a payload that failed to deserialize.
    ///
    /// Poison payloads never reach the handler, so they bypass the retry
    /// policy entirely: the raw bytes go straight to the dead-letter topic
    /// with zero recorded attempts.
    pub async fn publish_poison(
        &self,
        source_topic: &str,
        partition: i32,
        offset: i64,
        key: Option<String>,
        payload: Vec<u8>,
        headers: HashMap<String, Vec<u8>>,
        error: String,
    ) -> Result<()> {
        let (destination, partition) = dead_letter_destination(source_topic, partition, &self.suffix);

        let record = DeadLetterRecord {
            destination,
            source_topic: source_topic.to_string(),
            partition,
            offset,
            key,
            value: payload,
            headers,
            error,
            error_kind: "DeserializationError".to_string(),
            attempts: 0,
            failed_at: Utc::now(),
        };

        self.publish(&record).await
    }

    /// Flush any pending records
    pub fn flush(&self) -> Result<()> {
        self.producer
            .flush(self.send_timeout)
            .map_err(|e| Error::kafka(format!("Failed to flush dead-letter producer: {}", e)))
    }
}

#[async_trait]
impl<V> DeadLetterSink<V> for DeadLetterPublisher
where
    V: Serialize + Send + Sync,
{
    async fn publish(&self, record: &DeadLetterRecord<V>) -> Result<()> {
        let payload = serde_json::to_string(record).map_err(|e| {
            Error::from(KafkaIntegrationError::PublishError(format!(
                "Failed to serialize dead-letter record: {}",
                e
            )))
        })?;

        // Fall back to a position-derived key when the original had none
        let key = record
            .key
            .clone()
            .unwrap_or_else(|| format!("{}-{}", record.partition, record.offset));

        let kafka_record = FutureRecord::to(&record.destination)
            .partition(record.partition)
            .payload(&payload)
            .key(&key);

        let delivery_result = self
            .producer
            .send(kafka_record, Timeout::After(self.send_timeout))
            .await;

        match delivery_result {
            Ok(delivery) => {
                info!(
                    destination = %record.destination,
                    partition = delivery.0,
                    offset = delivery.1,
                    source_topic = %record.source_topic,
                    source_offset = record.offset,
                    "Published dead-letter record"
                );
                Ok(())
            },
            Err((kafka_error, _)) => {
                error!(
                    destination = %record.destination,
                    partition = record.partition,
                    error = %kafka_error,
                    "Failed to publish dead-letter record"
                );
                Err(Error::from(KafkaIntegrationError::PublishError(format!(
                    "Failed to publish to '{}': {}",
                    record.destination, kafka_error
                ))))
            },
        }
    }
}

/// Fixed-interval pulse publisher.
///
/// The message counter is owned by the publisher instance rather than shared
/// process-wide; a second publisher gets its own sequence.
pub struct PulsePublisher {
    /// Kafka producer instance
    producer: FutureProducer,

    /// Destination topic
    topic: String,

    /// Delay before the first pulse
    initial_delay: Duration,

    /// Fixed period between pulses
    interval: Duration,

    /// Timeout for send operations
    send_timeout: Duration,

    /// Publisher-owned message counter, used as the record key
    counter: u64,

    /// Shutdown signal
    shutdown: CancellationToken,
}

impl PulsePublisher {
    /// Create a new pulse publisher
    pub fn new(
        config: ClientConfig,
        publisher: &PublisherConfig,
        send_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let producer: FutureProducer = config
            .create()
            .map_err(|e| Error::from(KafkaIntegrationError::ConnectionError(e)))?;

        Ok(Self {
            producer,
            topic: publisher.topic.clone(),
            initial_delay: publisher.initial_delay(),
            interval: publisher.interval(),
            send_timeout,
            counter: 0,
            shutdown,
        })
    }

    /// Number of pulses published so far
    pub fn published(&self) -> u64 {
        self.counter
    }

    /// Run the publishing loop until shutdown.
    ///
    /// A failed publish is logged and the loop keeps ticking; the next pulse
    /// is not delayed by the failure.
    pub async fn run(mut self) -> Result<()> {
        info!(
            topic = %self.topic,
            interval_ms = self.interval.as_millis() as u64,
            "Starting pulse publisher"
        );

        tokio::select! {
            _ = self.shutdown.cancelled() => {
                info!("Pulse publisher stopped before first pulse");
                return Ok(());
            },
            _ = tokio::time::sleep(self.initial_delay) => {},
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(published = self.counter, "Pulse publisher stopping");
                    let _ = self.producer.flush(self.send_timeout);
                    return Ok(());
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.send_pulse().await {
                        warn!(error = %e, "Failed to publish pulse");
                    }
                },
            }
        }
    }

    /// Publish a single pulse
    async fn send_pulse(&mut self) -> Result<()> {
        self.counter += 1;
        let key = self.counter.to_string();
        let pulse = PulseMessage::new(format!("Testing {}", self.counter));
        let payload = pulse.to_payload()?;

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok(delivery) => {
                debug!(
                    topic = %self.topic,
                    key = %key,
                    partition = delivery.0,
                    offset = delivery.1,
                    "Pulse published"
                );
                Ok(())
            },
            Err((kafka_error, _)) => Err(Error::kafka(format!(
                "Failed to publish pulse to '{}': {}",
                self.topic, kafka_error
            ))),
        }
    }
}
