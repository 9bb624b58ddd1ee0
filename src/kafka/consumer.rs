//! Partition-ordered pulse consumer
//!
//! Each partition of the source topic is split into its own queue and owned
//! by exactly one worker task, so messages within a partition are processed
//! in strict offset order. A retrying message stalls only its own partition.
//! Offsets are stored only after a terminal outcome (processed or
//! dead-lettered), so an interrupted retry is redelivered on restart.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, DefaultConsumerContext, StreamConsumer};
use rdkafka::consumer::stream_consumer::StreamPartitionQueue;
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::types::RDKafkaErrorCode;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::producer::DeadLetterPublisher;
use super::recovery::{MessageHandler, RecoveryPolicy};
use super::{InboundMessage, KafkaIntegrationError, Outcome};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::PulseMessage;

/// Consumer that drives pulse messages through the recovery policy
pub struct PulseConsumer {
    /// Kafka consumer instance
    consumer: Arc<StreamConsumer>,

    /// Bounded-retry recovery policy
    policy: RecoveryPolicy,

    /// Application handler applied to each message
    handler: Arc<dyn MessageHandler<PulseMessage>>,

    /// Dead-letter publisher shared by all partition workers
    dead_letter: Arc<DeadLetterPublisher>,

    /// Source topic
    topic: String,

    /// Number of partitions to split into worker-owned queues
    partitions: i32,

    /// Bounds how many partition workers process concurrently
    semaphore: Arc<Semaphore>,

    /// Shutdown signal
    shutdown: CancellationToken,
}

impl PulseConsumer {
    /// Create a new pulse consumer
    pub fn new(
        config: &Config,
        handler: Arc<dyn MessageHandler<PulseMessage>>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let consumer: StreamConsumer = config
            .kafka
            .build_consumer_config()
            .create()
            .map_err(|e| Error::from(KafkaIntegrationError::ConnectionError(e)))?;

        consumer
            .subscribe(&[&config.publisher.topic])
            .map_err(|e| Error::kafka(format!("Failed to subscribe to topic: {}", e)))?;

        let dead_letter = Arc::new(DeadLetterPublisher::new(
            config.kafka.build_producer_config(),
            &config.recovery.dead_letter_suffix,
            config.kafka.send_timeout(),
        )?);

        let policy = RecoveryPolicy::new(
            config.recovery.max_attempts,
            config.recovery.backoff(),
            &config.recovery.dead_letter_suffix,
            shutdown.clone(),
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            policy,
            handler,
            dead_letter,
            topic: config.publisher.topic.clone(),
            partitions: config.provision.partitions,
            semaphore: Arc::new(Semaphore::new(config.recovery.consumer_concurrency)),
            shutdown,
        })
    }

    /// Start consuming until shutdown.
    ///
    /// Splits one queue per partition before the main stream is driven; the
    /// main stream itself should then never yield messages, but it must keep
    /// being polled to serve rebalances and client-level errors.
    pub async fn start(self) -> Result<()> {
        info!(
            topic = %self.topic,
            partitions = self.partitions,
            "Starting pulse consumer"
        );

        let mut workers: Vec<JoinHandle<Result<()>>> = Vec::new();
        for partition in 0..self.partitions {
            let queue = self
                .consumer
                .split_partition_queue(&self.topic, partition)
                .ok_or_else(|| {
                    Error::kafka(format!(
                        "Failed to split queue for partition {}",
                        partition
                    ))
                })?;

            let worker = PartitionWorker {
                consumer: Arc::clone(&self.consumer),
                queue,
                policy: self.policy.clone(),
                handler: Arc::clone(&self.handler),
                dead_letter: Arc::clone(&self.dead_letter),
                semaphore: Arc::clone(&self.semaphore),
                shutdown: self.shutdown.clone(),
                partition,
            };
            workers.push(tokio::spawn(worker.run()));
        }

        let stream = self.consumer.stream();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(message)) => {
                        // All provisioned partitions are split; a message here
                        // means the topic has more partitions than configured.
                        warn!(
                            partition = message.partition(),
                            offset = message.offset(),
                            "Message received on unsplit partition"
                        );
                    },
                    Some(Err(e)) => {
                        error!(error = %e, "Kafka consumer error");
                    },
                    None => break,
                },
            }
        }

        let mut first_error = None;
        for worker in workers {
            match worker.await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                },
                Err(e) => {
                    error!(error = %e, "Partition worker panicked");
                    if first_error.is_none() {
                        first_error = Some(Error::internal("Partition worker panicked"));
                    }
                },
            }
        }

        self.commit_stored_offsets();
        self.dead_letter.flush()?;
        info!("Pulse consumer stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Synchronously commit any offsets stored by the workers
    fn commit_stored_offsets(&self) {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => debug!("Committed stored offsets"),
            Err(rdkafka::error::KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("No stored offsets to commit");
            },
            Err(e) => warn!(error = %e, "Failed to commit offsets on shutdown"),
        }
    }
}

/// Worker owning a single partition queue
struct PartitionWorker {
    consumer: Arc<StreamConsumer>,
    queue: StreamPartitionQueue<DefaultConsumerContext>,
    policy: RecoveryPolicy,
    handler: Arc<dyn MessageHandler<PulseMessage>>,
    dead_letter: Arc<DeadLetterPublisher>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    partition: i32,
}

impl PartitionWorker {
    /// Consume the partition queue in offset order until shutdown.
    ///
    /// A dead-letter publish failure cancels the whole consumer: the policy
    /// cannot guarantee a terminal outcome for the message, so stopping and
    /// redelivering after restart is the only honest option.
    async fn run(self) -> Result<()> {
        debug!(partition = self.partition, "Partition worker started");

        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!(partition = self.partition, "Partition worker stopping");
                    return Ok(());
                },
                received = self.queue.recv() => match received {
                    Ok(message) => message,
                    Err(e) => {
                        error!(partition = self.partition, error = %e, "Partition queue error");
                        continue;
                    },
                },
            };

            let permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|e| Error::internal(format!("Failed to acquire semaphore: {}", e)))?;

            let result = self.handle_message(&message).await;
            drop(permit);

            match result {
                Ok(()) => {},
                Err(Error::ShuttingDown) => return Ok(()),
                Err(e) => {
                    error!(
                        partition = self.partition,
                        error = %e,
                        "Partition worker stopping on unrecoverable error"
                    );
                    self.shutdown.cancel();
                    return Err(e);
                },
            }
        }
    }

    /// Drive one message to a terminal outcome and store its offset.
    ///
    /// The offset is stored only after the outcome is known; a message that
    /// is cancelled mid-retry leaves no stored offset and is redelivered.
    async fn handle_message(&self, message: &BorrowedMessage<'_>) -> Result<()> {
        let topic = message.topic().to_string();
        let partition = message.partition();
        let offset = message.offset();

        let key = message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned());
        let headers = extract_headers(message);

        let payload = message.payload().unwrap_or_default();
        let value = match PulseMessage::from_payload(payload) {
            Ok(value) => value,
            Err(e) => {
                let error = KafkaIntegrationError::DeserializationError(e.to_string());
                warn!(
                    topic = %topic,
                    partition,
                    offset,
                    error = %error,
                    "Undecodable payload, routing to dead-letter topic"
                );
                self.dead_letter
                    .publish_poison(
                        &topic,
                        partition,
                        offset,
                        key,
                        payload.to_vec(),
                        headers,
                        error.to_string(),
                    )
                    .await?;
                self.store_offset(message)?;
                return Ok(());
            },
        };

        let inbound = InboundMessage {
            source_topic: topic,
            partition,
            offset,
            key,
            value,
            headers,
        };

        let span = crate::kafka_span!(inbound.source_topic, inbound.partition, inbound.offset);
        let outcome = self
            .policy
            .process(&inbound, self.handler.as_ref(), self.dead_letter.as_ref())
            .instrument(span.clone())
            .await?;

        match &outcome {
            Outcome::Processed { attempts } => {
                span.record("attempts", u64::from(*attempts));
                span.record("outcome", "processed");
            },
            Outcome::DeadLettered { destination } => {
                span.record("outcome", destination.as_str());
            },
        }

        self.store_offset(message)
    }

    /// Mark the message consumed; auto-commit flushes stored offsets
    fn store_offset(&self, message: &BorrowedMessage<'_>) -> Result<()> {
        self.consumer
            .store_offset_from_message(message)
            .map_err(|e| Error::kafka(format!("Failed to store offset: {}", e)))
    }
}

/// Copy record headers into an owned map
fn extract_headers(message: &BorrowedMessage<'_>) -> HashMap<String, Vec<u8>> {
    let mut headers = HashMap::new();
    if let Some(borrowed) = message.headers() {
        for header in borrowed.iter() {
            if let Some(value) = header.value {
                headers.insert(header.key.to_string(), value.to_vec());
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProvisionConfig, PublisherConfig, RecoveryConfig, ServerConfig};
    use crate::kafka::KafkaConfig;
    use crate::test_utils::CountingHandler;

    fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            kafka: KafkaConfig::default(),
            publisher: PublisherConfig::default(),
            recovery: RecoveryConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_consumer_creation() {
        let handler = Arc::new(CountingHandler::failing_first(0));
        let result = PulseConsumer::new(&test_config(), handler, CancellationToken::new());
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_consumer_policy_uses_configured_budget() {
        let mut config = test_config();
        config.recovery.max_attempts = 5;
        config.recovery.backoff_ms = 10;

        let handler = Arc::new(CountingHandler::failing_first(0));
        let consumer = PulseConsumer::new(&config, handler, CancellationToken::new()).unwrap();

        assert_eq!(consumer.policy.max_attempts(), 5);
        assert_eq!(
            consumer.policy.backoff(),
            std::time::Duration::from_millis(10)
        );
    }
}
