//! Kafka integration module for the pulse pipeline
//!
//! This module provides:
//! - Bounded-retry recovery policy with dead-letter routing
//! - Partition-ordered consumer with per-partition workers
//! - Scheduled pulse publisher and dead-letter publisher
//! - Topic provisioning
//! - Graceful shutdown without partial dead-letter publishes

pub mod admin;
pub mod config;
pub mod consumer;
pub mod producer;
pub mod recovery;

pub use config::KafkaConfig;
pub use consumer::PulseConsumer;
pub use producer::{DeadLetterPublisher, PulsePublisher};
pub use recovery::{
    dead_letter_destination, DeadLetterSink, MessageHandler, RecoveryPolicy, RetryState,
};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rdkafka::error::KafkaError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kafka-specific error types
#[derive(Debug, Error)]
pub enum KafkaIntegrationError {
    #[error("Kafka connection error: {0}")]
    ConnectionError(#[from] KafkaError),

    #[error("Message deserialization failed: {0}")]
    DeserializationError(String),

    #[error("Dead-letter publish failed: {0}")]
    PublishError(String),

    #[error("Topic provisioning failed: {0}")]
    ProvisioningError(String),
}

impl From<KafkaIntegrationError> for crate::error::Error {
    fn from(err: KafkaIntegrationError) -> Self {
        match err {
            KafkaIntegrationError::PublishError(msg) => crate::error::Error::Publish(msg),
            other => crate::error::Error::Kafka(other.to_string()),
        }
    }
}

/// One unit of work pulled from a partitioned, append-only log.
///
/// Owned by the delivery pipeline for the duration of one policy invocation;
/// never mutated after construction.
#[derive(Debug, Clone)]
pub struct InboundMessage<V> {
    /// Topic the message was consumed from
    pub source_topic: String,

    /// Partition within the source topic
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,

    /// Record key, if any
    pub key: Option<String>,

    /// Deserialized application value
    pub value: V,

    /// Record headers
    pub headers: HashMap<String, Vec<u8>>,
}

impl<V> InboundMessage<V> {
    /// Create a message with no key and no headers
    pub fn new(source_topic: impl Into<String>, partition: i32, offset: i64, value: V) -> Self {
        Self {
            source_topic: source_topic.into(),
            partition,
            offset,
            key: None,
            value,
            headers: HashMap::new(),
        }
    }

    /// Attach a record key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attach a header
    pub fn with_header(mut self, key: impl Into<String>, value: Vec<u8>) -> Self {
        self.headers.insert(key.into(), value);
        self
    }
}

/// Failure raised by an application handler while processing a message.
///
/// Recoverable via retry; only after exhaustion does it surface as
/// dead-letter metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Failure category, e.g. "InvalidMessage"
    pub kind: String,

    /// Human-readable description
    pub message: String,
}

impl HandlerFailure {
    /// Create a new handler failure
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// A message that exhausted its retries, bound for the dead-letter topic.
///
/// Carries the original message fields plus the failure description. Built
/// once by the recovery policy, published once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord<V> {
    /// Computed dead-letter topic (source topic + suffix)
    pub destination: String,

    /// Topic the message originally came from
    pub source_topic: String,

    /// Original partition; the dead-letter record is published to the same
    /// partition number for operational traceability
    pub partition: i32,

    /// Original offset
    pub offset: i64,

    /// Original record key
    pub key: Option<String>,

    /// Original deserialized value
    pub value: V,

    /// Original record headers
    pub headers: HashMap<String, Vec<u8>>,

    /// Failure description from the final attempt
    pub error: String,

    /// Failure category from the final attempt
    pub error_kind: String,

    /// How many handler invocations were made before giving up
    pub attempts: u32,

    /// When retries were exhausted
    pub failed_at: DateTime<Utc>,
}

/// Terminal outcome of one recovery-policy invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The handler succeeded within the attempt budget
    Processed {
        /// Number of handler invocations, including the successful one
        attempts: u32,
    },

    /// Retries were exhausted and a dead-letter record was published
    DeadLettered {
        /// Topic the dead-letter record was published to
        destination: String,
    },
}
