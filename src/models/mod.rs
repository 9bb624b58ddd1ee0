//! Data models for pulserelay
//!
//! This module contains the payload types exchanged over the pulse topic.

pub mod message;

pub use message::PulseMessage;
