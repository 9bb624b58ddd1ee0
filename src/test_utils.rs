//! Test utilities for pulserelay
//!
//! This module provides mock implementations and helpers for testing the
//! recovery policy without a broker.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::kafka::{
    DeadLetterRecord, DeadLetterSink, HandlerFailure, InboundMessage, MessageHandler,
};
use crate::models::PulseMessage;

/// In-memory dead-letter sink recording every published record
#[derive(Debug)]
pub struct MockDeadLetterSink<V = PulseMessage> {
    records: Arc<Mutex<Vec<DeadLetterRecord<V>>>>,
    fail_next: Arc<Mutex<Option<String>>>,
}

impl<V> Default for MockDeadLetterSink<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MockDeadLetterSink<V> {
    /// Create a new mock sink
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Make the next publish fail with the given message
    pub fn fail_next_publish(&self, error_message: &str) {
        *self.fail_next.lock().unwrap() = Some(error_message.to_string());
    }
}

impl<V: Clone> MockDeadLetterSink<V> {
    /// All records published so far
    pub fn records(&self) -> Vec<DeadLetterRecord<V>> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl<V> DeadLetterSink<V> for MockDeadLetterSink<V>
where
    V: Serialize + Clone + Send + Sync,
{
    async fn publish(&self, record: &DeadLetterRecord<V>) -> Result<()> {
        if let Some(msg) = self.fail_next.lock().unwrap().take() {
            return Err(Error::publish(msg));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Handler that fails a configured number of initial invocations, then
/// succeeds, counting every invocation
#[derive(Debug)]
pub struct CountingHandler {
    fail_first: u32,
    invocations: AtomicU32,
}

impl CountingHandler {
    /// Fail the first `n` invocations, then succeed
    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            invocations: AtomicU32::new(0),
        }
    }

    /// Fail on every invocation
    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    /// Number of invocations so far
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<V: Send + Sync> MessageHandler<V> for CountingHandler {
    async fn handle(
        &self,
        _message: &InboundMessage<V>,
    ) -> std::result::Result<(), HandlerFailure> {
        let attempt = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            Err(HandlerFailure::new(
                "HandlerFailure",
                format!("induced failure on invocation {}", attempt),
            ))
        } else {
            Ok(())
        }
    }
}

/// Handler that fails on a case-insensitive sentinel body, counting every
/// invocation
#[derive(Debug)]
pub struct SentinelHandler {
    sentinel: String,
    invocations: AtomicU32,
}

impl SentinelHandler {
    /// Create a handler that rejects the given sentinel body
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            invocations: AtomicU32::new(0),
        }
    }

    /// Number of invocations so far
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler<PulseMessage> for SentinelHandler {
    async fn handle(
        &self,
        message: &InboundMessage<PulseMessage>,
    ) -> std::result::Result<(), HandlerFailure> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if message.value.message.eq_ignore_ascii_case(&self.sentinel) {
            Err(HandlerFailure::new(
                "InvalidMessage",
                "the message is invalid",
            ))
        } else {
            Ok(())
        }
    }
}

/// Create an inbound pulse message with the given body and position
pub fn pulse_inbound(body: &str, partition: i32, offset: i64) -> InboundMessage<PulseMessage> {
    InboundMessage::new("topic2", partition, offset, PulseMessage::new(body))
        .with_key(offset.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_handler_recovers_after_failures() {
        let handler = CountingHandler::failing_first(2);
        let message = pulse_inbound("bar", 0, 1);

        assert!(handler.handle(&message).await.is_err());
        assert!(handler.handle(&message).await.is_err());
        assert!(handler.handle(&message).await.is_ok());
        assert_eq!(handler.invocations(), 3);
    }

    #[tokio::test]
    async fn test_sentinel_handler_is_case_insensitive() {
        let handler = SentinelHandler::new("FOO");

        assert!(handler.handle(&pulse_inbound("foo", 0, 1)).await.is_err());
        assert!(handler.handle(&pulse_inbound("FOO", 0, 2)).await.is_err());
        assert!(handler.handle(&pulse_inbound("bar", 0, 3)).await.is_ok());
        assert_eq!(handler.invocations(), 3);
    }

    #[tokio::test]
    async fn test_mock_sink_fail_next_is_one_shot() {
        let sink: MockDeadLetterSink<PulseMessage> = MockDeadLetterSink::new();
        sink.fail_next_publish("broker down");

        let message = pulse_inbound("FOO", 1, 42);
        let record = DeadLetterRecord {
            destination: "topic2.DLT".to_string(),
            source_topic: message.source_topic.clone(),
            partition: message.partition,
            offset: message.offset,
            key: message.key.clone(),
            value: message.value.clone(),
            headers: message.headers.clone(),
            error: "the message is invalid".to_string(),
            error_kind: "InvalidMessage".to_string(),
            attempts: 3,
            failed_at: chrono::Utc::now(),
        };

        assert!(matches!(
            sink.publish(&record).await,
            Err(Error::Publish(_))
        ));
        assert!(sink.publish(&record).await.is_ok());
        assert_eq!(sink.records().len(), 1);
    }
}
