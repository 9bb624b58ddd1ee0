//! pulserelay producer
//!
//! Provisions the pulse topic, then publishes a timestamped pulse on a fixed
//! interval while serving liveness/readiness endpoints.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pulserelay::api::{create_server, shutdown_signal, HealthState, HealthStatus};
use pulserelay::config::Config;
use pulserelay::kafka::{admin, PulsePublisher};
use pulserelay::{logging, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::from_env()?);
    config.validate()?;

    logging::init_tracing(&config.server.log_level, &config.server.environment)?;
    config.log_config();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting pulserelay producer"
    );

    let shutdown = CancellationToken::new();

    if config.provision.auto_create {
        admin::ensure_topics(&config.kafka, &config.provision, &[&config.publisher.topic])
            .await?;
    }

    let health = Arc::new(HealthState::new());
    health
        .update_component("kafka_producer", HealthStatus::Healthy, None)
        .await;

    let publisher = PulsePublisher::new(
        config.kafka.build_producer_config(),
        &config.publisher,
        config.kafka.send_timeout(),
        shutdown.clone(),
    )?;

    let server_handle = {
        let server_config = config.server.clone();
        let health = Arc::clone(&health);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { create_server(&server_config, health, shutdown).await })
    };
    let publisher_handle = tokio::spawn(publisher.run());

    shutdown_signal().await;
    info!("Shutdown signal received");
    shutdown.cancel();

    match publisher_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "Pulse publisher failed"),
        Err(e) => error!(error = %e, "Pulse publisher task panicked"),
    }

    match server_handle.await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
    }

    info!("pulserelay producer shutdown complete");
    Ok(())
}
