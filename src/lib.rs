//! pulserelay Library
//!
//! A minimal Kafka producer/consumer pair: a scheduled publisher of
//! timestamped pulses and a partition-ordered consumer that drives each
//! message through a bounded-retry recovery policy with dead-letter routing.

pub mod api;
pub mod config;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod models;
pub mod test_utils;

// Re-export commonly used types at the crate root
pub use config::Config;
pub use error::{Error, Result};

// Re-export core pipeline types
pub use kafka::{
    dead_letter_destination, DeadLetterRecord, DeadLetterSink, HandlerFailure, InboundMessage,
    MessageHandler, Outcome, PulseConsumer, PulsePublisher, RecoveryPolicy,
};
pub use models::PulseMessage;

// Re-export API server functions
pub use api::server::{create_router, create_server, shutdown_signal};
