//! pulserelay consumer
//!
//! Provisions the dead-letter topic, then consumes pulses in per-partition
//! offset order, applying the bounded-retry recovery policy to every
//! message, while serving liveness/readiness endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pulserelay::api::{create_server, shutdown_signal, HealthState, HealthStatus};
use pulserelay::config::Config;
use pulserelay::kafka::{admin, dead_letter_destination, PulseConsumer};
use pulserelay::{logging, HandlerFailure, InboundMessage, MessageHandler, PulseMessage, Result};

/// Demo handler: logs each pulse.
///
/// An optional sentinel body (FAULT_SENTINEL env var) makes the handler fail
/// on a case-insensitive match, exercising the retry/dead-letter path end to
/// end. Fault injection is a property of this demo binary, not of the
/// recovery policy.
struct LoggingPulseHandler {
    sentinel: Option<String>,
}

#[async_trait]
impl MessageHandler<PulseMessage> for LoggingPulseHandler {
    async fn handle(
        &self,
        message: &InboundMessage<PulseMessage>,
    ) -> std::result::Result<(), HandlerFailure> {
        if let Some(sentinel) = &self.sentinel {
            if message.value.message.eq_ignore_ascii_case(sentinel) {
                return Err(HandlerFailure::new(
                    "InvalidMessage",
                    "the message is invalid",
                ));
            }
        }

        info!(
            topic = %message.source_topic,
            key = message.key.as_deref().unwrap_or(""),
            value = %message.value,
            offset = message.offset,
            partition = message.partition,
            headers = message.headers.len(),
            "Message received"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    logging::init_tracing(&config.server.log_level, &config.server.environment)?;
    config.log_config();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting pulserelay consumer"
    );

    let shutdown = CancellationToken::new();

    if config.provision.auto_create {
        let (dead_letter_topic, _) = dead_letter_destination(
            &config.publisher.topic,
            0,
            &config.recovery.dead_letter_suffix,
        );
        admin::ensure_topics(&config.kafka, &config.provision, &[&dead_letter_topic]).await?;
    }

    let sentinel = std::env::var("FAULT_SENTINEL").ok();
    if let Some(sentinel) = &sentinel {
        warn!(sentinel = %sentinel, "Fault injection enabled, sentinel pulses will be dead-lettered");
    }
    let handler = Arc::new(LoggingPulseHandler { sentinel });

    let health = Arc::new(HealthState::new());
    health
        .update_component("kafka_consumer", HealthStatus::Healthy, None)
        .await;

    let consumer = PulseConsumer::new(&config, handler, shutdown.clone())?;

    let server_handle = {
        let server_config = config.server.clone();
        let health = Arc::clone(&health);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { create_server(&server_config, health, shutdown).await })
    };
    let consumer_handle = tokio::spawn(consumer.start());

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        },
        _ = shutdown.cancelled() => {
            warn!("Consumer requested shutdown");
        },
    }
    shutdown.cancel();

    let consumer_result = match consumer_handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Consumer task panicked");
            Err(pulserelay::Error::internal("Consumer task panicked"))
        },
    };

    if let Err(e) = &consumer_result {
        health
            .update_component("kafka_consumer", HealthStatus::Unhealthy, Some(e.to_string()))
            .await;
        error!(error = %e, "Consumer stopped with error");
    }

    match server_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    info!("pulserelay consumer shutdown complete");
    consumer_result
}
