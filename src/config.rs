//! Configuration module for pulserelay
//!
//! This module handles loading and validating configuration from environment
//! variables, providing strongly-typed configuration structures for all
//! application components.

use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::kafka::KafkaConfig;

/// Main configuration structure for pulserelay
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct Config {
    /// Server configuration
    #[serde(flatten)]
    #[envconfig(nested)]
    pub server: ServerConfig,

    /// Kafka client configuration
    #[serde(flatten)]
    #[envconfig(nested)]
    pub kafka: KafkaConfig,

    /// Pulse publisher configuration
    #[serde(flatten)]
    #[envconfig(nested)]
    pub publisher: PublisherConfig,

    /// Bounded-retry recovery configuration
    #[serde(flatten)]
    #[envconfig(nested)]
    pub recovery: RecoveryConfig,

    /// Topic provisioning configuration
    #[serde(flatten)]
    #[envconfig(nested)]
    pub provision: ProvisionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct ServerConfig {
    /// Host to bind to
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,

    /// Log level
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// Environment (development, staging, production)
    #[envconfig(from = "ENVIRONMENT", default = "development")]
    pub environment: String,

    /// Request timeout in seconds
    #[envconfig(from = "REQUEST_TIMEOUT_SECS", default = "30")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[envconfig(from = "SHUTDOWN_TIMEOUT_SECS", default = "30")]
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Get the server address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            environment: "development".to_string(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Pulse publisher configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct PublisherConfig {
    /// Topic the pulses are published to (and consumed from)
    #[envconfig(from = "PULSE_TOPIC", default = "topic2")]
    pub topic: String,

    /// Fixed period between pulses in milliseconds
    #[envconfig(from = "PULSE_INTERVAL_MS", default = "3000")]
    pub interval_ms: u64,

    /// Delay before the first pulse in milliseconds
    #[envconfig(from = "PULSE_INITIAL_DELAY_MS", default = "1000")]
    pub initial_delay_ms: u64,
}

impl PublisherConfig {
    /// Get the publish interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Get the initial delay as Duration
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            topic: "topic2".to_string(),
            interval_ms: 3000,
            initial_delay_ms: 1000,
        }
    }
}

/// Bounded-retry recovery configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct RecoveryConfig {
    /// Total handler-invocation budget per message (>= 1)
    #[envconfig(from = "RECOVERY_MAX_ATTEMPTS", default = "3")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    #[envconfig(from = "RECOVERY_BACKOFF_MS", default = "1500")]
    pub backoff_ms: u64,

    /// Suffix appended to the source topic to form the dead-letter topic
    #[envconfig(from = "DEAD_LETTER_SUFFIX", default = ".DLT")]
    pub dead_letter_suffix: String,

    /// Number of partition workers processing concurrently (>= 1)
    #[envconfig(from = "CONSUMER_CONCURRENCY", default = "3")]
    pub consumer_concurrency: usize,
}

impl RecoveryConfig {
    /// Get the retry backoff as Duration
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1500,
            dead_letter_suffix: ".DLT".to_string(),
            consumer_concurrency: 3,
        }
    }
}

/// Topic provisioning configuration
#[derive(Debug, Clone, Deserialize, Serialize, Envconfig)]
pub struct ProvisionConfig {
    /// Partition count for created topics
    #[envconfig(from = "TOPIC_PARTITIONS", default = "3")]
    pub partitions: i32,

    /// Replication factor for created topics
    #[envconfig(from = "TOPIC_REPLICATION", default = "3")]
    pub replication: i32,

    /// Minimum in-sync replicas for created topics
    #[envconfig(from = "TOPIC_MIN_INSYNC_REPLICAS", default = "2")]
    pub min_insync_replicas: i32,

    /// Create topics at startup if they do not exist
    #[envconfig(from = "TOPIC_AUTO_CREATE", default = "true")]
    pub auto_create: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            partitions: 3,
            replication: 3,
            min_insync_replicas: 2,
            auto_create: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenv::dotenv().ok();

        Config::init_from_env().map_err(Error::from)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("Server port cannot be 0"));
        }

        if self.kafka.brokers.is_empty() {
            return Err(Error::config("Kafka brokers cannot be empty"));
        }

        if self.publisher.topic.is_empty() {
            return Err(Error::config("Pulse topic cannot be empty"));
        }

        if self.recovery.max_attempts == 0 {
            return Err(Error::config("Recovery max attempts must be at least 1"));
        }

        if self.recovery.consumer_concurrency == 0 {
            return Err(Error::config("Consumer concurrency must be at least 1"));
        }

        if self.recovery.dead_letter_suffix.is_empty() {
            return Err(Error::config("Dead-letter suffix cannot be empty"));
        }

        if self.provision.partitions < 1 {
            return Err(Error::config("Topic partition count must be at least 1"));
        }

        Ok(())
    }

    /// Log configuration with structured fields
    pub fn log_config(&self) {
        tracing::info!(
            server_address = %self.server.address(),
            environment = %self.server.environment,
            log_level = %self.server.log_level,
            "Server configuration"
        );

        tracing::info!(
            brokers = %self.kafka.brokers,
            group_id = %self.kafka.group_id,
            topic = %self.publisher.topic,
            "Kafka configuration"
        );

        tracing::info!(
            interval_ms = self.publisher.interval_ms,
            initial_delay_ms = self.publisher.initial_delay_ms,
            "Publisher configuration"
        );

        tracing::info!(
            max_attempts = self.recovery.max_attempts,
            backoff_ms = self.recovery.backoff_ms,
            dead_letter_suffix = %self.recovery.dead_letter_suffix,
            concurrency = self.recovery.consumer_concurrency,
            "Recovery configuration"
        );

        tracing::info!(
            partitions = self.provision.partitions,
            replication = self.provision.replication,
            min_insync_replicas = self.provision.min_insync_replicas,
            auto_create = self.provision.auto_create,
            "Provisioning configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            kafka: KafkaConfig::default(),
            publisher: PublisherConfig::default(),
            recovery: RecoveryConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert!(config.is_development());
        assert!(!config.is_production());
    }

    #[test]
    fn test_recovery_defaults_match_policy_contract() {
        let config = RecoveryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff(), Duration::from_millis(1500));
        assert_eq!(config.dead_letter_suffix, ".DLT");
        assert_eq!(config.consumer_concurrency, 3);
    }

    #[test]
    fn test_publisher_defaults() {
        let config = PublisherConfig::default();
        assert_eq!(config.topic, "topic2");
        assert_eq!(config.interval(), Duration::from_secs(3));
        assert_eq!(config.initial_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_validation_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = test_config();
        config.recovery.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = test_config();
        config.recovery.consumer_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_suffix() {
        let mut config = test_config();
        config.recovery.dead_letter_suffix = String::new();
        assert!(config.validate().is_err());
    }
}
