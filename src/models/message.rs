//! Pulse message payload
//!
//! The value type published to the pulse topic and consumed by the listener:
//! a short text body plus the UTC timestamp at which it was produced. Encoded
//! as JSON on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single timestamped pulse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseMessage {
    /// Text body of the pulse
    pub message: String,

    /// When the pulse was produced
    pub timestamp: DateTime<Utc>,
}

impl PulseMessage {
    /// Create a new pulse with the given body, stamped now
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a pulse with an explicit timestamp
    pub fn with_timestamp(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }

    /// Encode to the JSON wire format
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the JSON wire format
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl std::fmt::Display for PulseMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.message, self.timestamp.to_rfc3339())
    }
}
