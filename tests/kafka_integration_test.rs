//! Integration tests for Kafka consumer functionality
//!
//! Tests marked `#[ignore]` require a broker at localhost:9092.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tokio_util::sync::CancellationToken;

use pulserelay::config::{Config, ProvisionConfig, PublisherConfig, RecoveryConfig, ServerConfig};
use pulserelay::kafka::{admin, KafkaConfig, PulseConsumer};
use pulserelay::test_utils::SentinelHandler;
use pulserelay::{DeadLetterRecord, PulseMessage};

/// Test Kafka broker address
const TEST_KAFKA_BROKER: &str = "localhost:9092";

/// Build a config pointed at the test broker and the given topic
fn test_config(topic: &str, group_id: &str) -> Config {
    Config {
        server: ServerConfig::default(),
        kafka: KafkaConfig {
            brokers: TEST_KAFKA_BROKER.to_string(),
            group_id: group_id.to_string(),
            session_timeout_ms: 6000,
            ..KafkaConfig::default()
        },
        publisher: PublisherConfig {
            topic: topic.to_string(),
            ..PublisherConfig::default()
        },
        recovery: RecoveryConfig {
            backoff_ms: 100,
            ..RecoveryConfig::default()
        },
        provision: ProvisionConfig {
            partitions: 3,
            replication: 1,
            min_insync_replicas: 1,
            auto_create: true,
        },
    }
}

/// Create the source topic and its dead-letter counterpart
async fn create_test_topics(config: &Config, dead_letter_topic: &str) {
    admin::ensure_topics(
        &config.kafka,
        &config.provision,
        &[&config.publisher.topic, dead_letter_topic],
    )
    .await
    .expect("Failed to create topics");
}

/// Publish a pulse to the given topic
async fn send_test_pulse(topic: &str, key: &str, pulse: &PulseMessage) {
    let producer: FutureProducer = ClientConfig::new()
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .set("message.timeout.ms", "5000")
        .create()
        .expect("Failed to create producer");

    let payload = pulse.to_payload().expect("Failed to serialize pulse");
    let record = FutureRecord::to(topic).payload(&payload).key(key);

    producer
        .send(record, Timeout::After(Duration::from_secs(5)))
        .await
        .map_err(|(err, _)| err)
        .expect("Failed to send pulse");
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_consumer_processes_valid_pulse() {
    let topic = "pulserelay-test-valid";
    let config = test_config(topic, "pulserelay-test-valid-group");
    create_test_topics(&config, "pulserelay-test-valid.DLT").await;

    send_test_pulse(topic, "1", &PulseMessage::new("Testing 1")).await;

    let shutdown = CancellationToken::new();
    let handler = Arc::new(SentinelHandler::new("FOO"));
    let consumer = PulseConsumer::new(&config, handler.clone(), shutdown.clone())
        .expect("Failed to create consumer");

    let consumer_handle = tokio::spawn(consumer.start());

    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();
    consumer_handle
        .await
        .expect("Consumer task panicked")
        .expect("Consumer failed");

    assert!(
        handler.invocations() >= 1,
        "Handler should have seen the pulse"
    );
}

#[tokio::test]
#[ignore] // Requires Kafka to be running
async fn test_sentinel_pulse_is_dead_lettered() {
    let topic = "pulserelay-test-sentinel";
    let dead_letter_topic = "pulserelay-test-sentinel.DLT";
    let config = test_config(topic, "pulserelay-test-sentinel-group");
    create_test_topics(&config, dead_letter_topic).await;

    send_test_pulse(topic, "1", &PulseMessage::new("FOO")).await;

    let shutdown = CancellationToken::new();
    let handler = Arc::new(SentinelHandler::new("FOO"));
    let consumer = PulseConsumer::new(&config, handler.clone(), shutdown.clone())
        .expect("Failed to create consumer");

    let consumer_handle = tokio::spawn(consumer.start());

    // Three attempts with 100ms backoff plus consumer startup
    tokio::time::sleep(Duration::from_secs(8)).await;
    shutdown.cancel();
    consumer_handle
        .await
        .expect("Consumer task panicked")
        .expect("Consumer failed");

    assert_eq!(handler.invocations(), 3);

    // Verify the record landed on the dead-letter topic
    let dlt_consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .set("group.id", "pulserelay-test-sentinel-dlt-reader")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Failed to create DLT consumer");
    dlt_consumer
        .subscribe(&[dead_letter_topic])
        .expect("Failed to subscribe to DLT");

    let message = tokio::time::timeout(Duration::from_secs(10), dlt_consumer.recv())
        .await
        .expect("Timed out waiting for dead-letter record")
        .expect("DLT consumer error");

    let payload = message.payload().expect("Dead-letter record has no payload");
    let record: DeadLetterRecord<PulseMessage> =
        serde_json::from_slice(payload).expect("Failed to parse dead-letter record");

    assert_eq!(record.source_topic, topic);
    assert_eq!(record.destination, dead_letter_topic);
    assert_eq!(record.value.message, "FOO");
    assert_eq!(record.error_kind, "InvalidMessage");
    assert_eq!(record.attempts, 3);
    assert_eq!(message.partition(), record.partition);
}

#[test]
fn test_kafka_config_defaults() {
    let config = KafkaConfig::default();

    assert_eq!(config.brokers, "localhost:9092");
    assert_eq!(config.group_id, "demo-consumer");
    assert_eq!(config.session_timeout_ms, 30000);
    assert_eq!(config.auto_offset_reset, "earliest");
}

#[test]
fn test_kafka_config_from_env() {
    std::env::set_var("KAFKA_BROKERS", "broker1:9092,broker2:9092");
    std::env::set_var("KAFKA_GROUP_ID", "test-group");
    std::env::set_var("KAFKA_SESSION_TIMEOUT_MS", "6000");

    let config = KafkaConfig::from_env().expect("Failed to load config from env");

    assert_eq!(config.brokers, "broker1:9092,broker2:9092");
    assert_eq!(config.group_id, "test-group");
    assert_eq!(config.session_timeout_ms, 6000);

    std::env::remove_var("KAFKA_BROKERS");
    std::env::remove_var("KAFKA_GROUP_ID");
    std::env::remove_var("KAFKA_SESSION_TIMEOUT_MS");
}

#[test]
fn test_dead_letter_publisher_creation() {
    use pulserelay::kafka::DeadLetterPublisher;

    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", TEST_KAFKA_BROKER)
        .set("message.timeout.ms", "5000");

    let publisher = DeadLetterPublisher::new(config, ".DLT", Duration::from_secs(5));
    assert!(publisher.is_ok());
}
