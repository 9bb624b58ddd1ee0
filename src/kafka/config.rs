//! Kafka client configuration module

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kafka client configuration settings
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct KafkaConfig {
    /// Kafka broker addresses (comma-separated)
    #[serde(default = "default_brokers")]
    #[envconfig(from = "KAFKA_BROKERS", default = "localhost:9092")]
    pub brokers: String,

    /// Consumer group ID
    #[serde(default = "default_group_id")]
    #[envconfig(from = "KAFKA_GROUP_ID", default = "demo-consumer")]
    pub group_id: String,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout")]
    #[envconfig(from = "KAFKA_SESSION_TIMEOUT_MS", default = "30000")]
    pub session_timeout_ms: u32,

    /// Maximum poll interval in milliseconds. Must comfortably exceed
    /// max_attempts * backoff or the broker will evict a retrying consumer.
    #[serde(default = "default_max_poll_interval")]
    #[envconfig(from = "KAFKA_MAX_POLL_INTERVAL_MS", default = "300000")]
    pub max_poll_interval_ms: u32,

    /// Where to start when the group has no committed offset
    #[serde(default = "default_auto_offset_reset")]
    #[envconfig(from = "KAFKA_AUTO_OFFSET_RESET", default = "earliest")]
    pub auto_offset_reset: String,

    /// Enable idempotent producer
    #[serde(default = "default_idempotent_producer")]
    #[envconfig(from = "KAFKA_IDEMPOTENT_PRODUCER", default = "true")]
    pub idempotent_producer: bool,

    /// Compression type for produced records
    #[serde(default = "default_compression_type")]
    #[envconfig(from = "KAFKA_COMPRESSION_TYPE", default = "snappy")]
    pub compression_type: String,

    /// Timeout for produce operations in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    #[envconfig(from = "KAFKA_SEND_TIMEOUT_MS", default = "30000")]
    pub send_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            group_id: default_group_id(),
            session_timeout_ms: default_session_timeout(),
            max_poll_interval_ms: default_max_poll_interval(),
            auto_offset_reset: default_auto_offset_reset(),
            idempotent_producer: default_idempotent_producer(),
            compression_type: default_compression_type(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl KafkaConfig {
    /// Create a new KafkaConfig from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        <Self as envconfig::Envconfig>::init_from_env()
    }

    /// Get session timeout as Duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms as u64)
    }

    /// Get send timeout as Duration
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Build rdkafka consumer configuration.
    ///
    /// Offsets are stored explicitly by the partition workers after a
    /// terminal outcome; auto-commit then flushes the stored offsets. A
    /// message that is still retrying therefore never has its offset
    /// committed.
    pub fn build_consumer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set(
                "max.poll.interval.ms",
                self.max_poll_interval_ms.to_string(),
            )
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.partition.eof", "false");

        config
    }

    /// Build rdkafka producer configuration
    pub fn build_producer_config(&self) -> rdkafka::ClientConfig {
        let mut config = rdkafka::ClientConfig::new();

        config
            .set("bootstrap.servers", &self.brokers)
            .set("message.timeout.ms", self.send_timeout_ms.to_string())
            .set("compression.type", &self.compression_type);

        if self.idempotent_producer {
            config
                .set("enable.idempotence", "true")
                .set("acks", "all")
                .set("retries", "10")
                .set("max.in.flight.requests.per.connection", "5");
        } else {
            config.set("acks", "1");
        }

        config
    }
}

// Default value functions
fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "demo-consumer".to_string()
}

fn default_session_timeout() -> u32 {
    30000 // 30 seconds
}

fn default_max_poll_interval() -> u32 {
    300000 // 5 minutes
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_idempotent_producer() -> bool {
    true
}

fn default_compression_type() -> String {
    "snappy".to_string()
}

fn default_send_timeout_ms() -> u64 {
    30000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.group_id, "demo-consumer");
        assert_eq!(config.auto_offset_reset, "earliest");
        assert!(config.idempotent_producer);
    }

    #[test]
    fn test_duration_conversions() {
        let config = KafkaConfig::default();
        assert_eq!(config.session_timeout(), Duration::from_secs(30));
        assert_eq!(config.send_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_consumer_config_build() {
        let config = KafkaConfig::default();
        let consumer_config = config.build_consumer_config();

        assert_eq!(
            consumer_config.get("enable.auto.offset.store"),
            Some("false")
        );
        assert_eq!(consumer_config.get("group.id"), Some("demo-consumer"));
    }

    #[test]
    fn test_producer_config_idempotence() {
        let config = KafkaConfig::default();
        let producer_config = config.build_producer_config();

        assert_eq!(producer_config.get("enable.idempotence"), Some("true"));
        assert_eq!(producer_config.get("acks"), Some("all"));
    }
}
