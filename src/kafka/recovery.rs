//! Bounded-retry recovery policy with dead-letter routing
//!
//! Wraps an application handler: on failure the handler is re-invoked up to
//! a fixed attempt budget with a fixed delay between attempts, and a message
//! that exhausts the budget is converted into exactly one dead-letter record.
//! Retries block the owning partition on purpose — per-partition ordering is
//! preserved by never advancing past a message that has no terminal outcome.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{DeadLetterRecord, HandlerFailure, InboundMessage, Outcome};
use crate::error::{Error, Result};

/// Compute the dead-letter destination for a failed message.
///
/// The destination partition equals the source partition, not re-hashed by
/// key, so each source partition maps to a stable dead-letter partition.
/// The dead-letter topic must be provisioned with at least as many
/// partitions as the source topic.
pub fn dead_letter_destination(topic: &str, partition: i32, suffix: &str) -> (String, i32) {
    (format!("{}{}", topic, suffix), partition)
}

/// Application handler applied to each inbound message.
///
/// Returning `Err` is an expected, recoverable condition absorbed by the
/// retry policy; it is not an exception path.
#[async_trait]
pub trait MessageHandler<V>: Send + Sync {
    /// Process one message
    async fn handle(&self, message: &InboundMessage<V>)
        -> std::result::Result<(), HandlerFailure>;
}

/// Publish interface for dead-letter records.
///
/// Implemented by the Kafka dead-letter publisher and by the in-memory mock
/// used in tests.
#[async_trait]
pub trait DeadLetterSink<V: Serialize + Send + Sync>: Send + Sync {
    /// Publish one dead-letter record
    async fn publish(&self, record: &DeadLetterRecord<V>) -> Result<()>;
}

/// Attempt counter for one message identity.
///
/// Created on first failure, discarded on success or exhaustion. Lives on
/// the owning worker's stack; never persisted across restarts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    /// Create a fresh state with zero recorded attempts
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed handler invocation, returning the new attempt count
    pub fn record_failure(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Number of failed invocations recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// The bounded-retry recovery policy.
///
/// `max_attempts` is the total handler-invocation budget (>= 1); `backoff`
/// is a fixed delay between attempts — no jitter, no exponential growth.
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    max_attempts: u32,
    backoff: Duration,
    dead_letter_suffix: String,
    shutdown: CancellationToken,
}

impl RecoveryPolicy {
    /// Create a policy. A `max_attempts` of zero is clamped to one so the
    /// handler always runs at least once.
    pub fn new(
        max_attempts: u32,
        backoff: Duration,
        dead_letter_suffix: impl Into<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            dead_letter_suffix: dead_letter_suffix.into(),
            shutdown,
        }
    }

    /// Total handler-invocation budget per message
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Fixed delay between attempts
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Apply the handler to one message under the retry budget.
    ///
    /// Returns `Outcome::Processed` on success, `Outcome::DeadLettered`
    /// after exhaustion, `Error::ShuttingDown` if cancelled during a backoff
    /// wait (no dead-letter record is published in that case), and
    /// `Error::Publish` if the dead-letter publish itself fails — the one
    /// case where the message reaches no terminal outcome.
    pub async fn process<V, H, S>(
        &self,
        message: &InboundMessage<V>,
        handler: &H,
        sink: &S,
    ) -> Result<Outcome>
    where
        V: Serialize + Clone + Send + Sync,
        H: MessageHandler<V> + ?Sized,
        S: DeadLetterSink<V> + ?Sized,
    {
        let mut state = RetryState::new();

        let failure = loop {
            match handler.handle(message).await {
                Ok(()) => {
                    let attempts = state.attempts() + 1;
                    debug!(
                        topic = %message.source_topic,
                        partition = message.partition,
                        offset = message.offset,
                        attempts,
                        "Message processed"
                    );
                    return Ok(Outcome::Processed { attempts });
                },
                Err(failure) => {
                    let attempts = state.record_failure();
                    if attempts >= self.max_attempts {
                        break failure;
                    }

                    warn!(
                        topic = %message.source_topic,
                        partition = message.partition,
                        offset = message.offset,
                        attempt = attempts,
                        max_attempts = self.max_attempts,
                        error = %failure,
                        "Handler failed, retrying after backoff"
                    );

                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            debug!(
                                topic = %message.source_topic,
                                partition = message.partition,
                                offset = message.offset,
                                "Retry abandoned, shutdown in progress"
                            );
                            return Err(Error::ShuttingDown);
                        },
                        _ = tokio::time::sleep(self.backoff) => {},
                    }
                },
            }
        };

        let (destination, partition) = dead_letter_destination(
            &message.source_topic,
            message.partition,
            &self.dead_letter_suffix,
        );

        let record = DeadLetterRecord {
            destination: destination.clone(),
            source_topic: message.source_topic.clone(),
            partition,
            offset: message.offset,
            key: message.key.clone(),
            value: message.value.clone(),
            headers: message.headers.clone(),
            error: failure.message,
            error_kind: failure.kind,
            attempts: state.attempts(),
            failed_at: Utc::now(),
        };

        sink.publish(&record).await.map_err(|e| match e {
            publish @ Error::Publish(_) => publish,
            other => Error::publish(other.to_string()),
        })?;

        error!(
            topic = %message.source_topic,
            partition = message.partition,
            offset = message.offset,
            destination = %destination,
            attempts = record.attempts,
            error = %record.error,
            "Retries exhausted, message dead-lettered"
        );

        Ok(Outcome::DeadLettered { destination })
    }
}
