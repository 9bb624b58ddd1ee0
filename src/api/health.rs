//! Health check endpoints
//!
//! Liveness and readiness checks for Kubernetes and other orchestration
//! platforms. The kafka components report their health into the shared
//! `HealthState`; readiness aggregates over it.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{ComponentHealth, HealthResponse, HealthStatus, ReadyResponse};

/// Application state for health checks
#[derive(Clone, Default)]
pub struct HealthState {
    /// Shared state for component health tracking
    pub components: Arc<tokio::sync::RwLock<HashMap<String, ComponentHealth>>>,
}

impl HealthState {
    /// Create a new health state
    pub fn new() -> Self {
        Self::default()
    }

    /// Update component health status
    pub async fn update_component(
        &self,
        name: impl Into<String>,
        status: HealthStatus,
        message: Option<String>,
    ) {
        let mut components = self.components.write().await;
        components.insert(
            name.into(),
            ComponentHealth {
                status,
                message,
                last_check: Utc::now(),
            },
        );
    }

    /// Get overall health status
    pub async fn get_status(&self) -> HealthStatus {
        let components = self.components.read().await;

        if components.values().any(|c| c.status == HealthStatus::Unhealthy) {
            return HealthStatus::Unhealthy;
        }

        if components.values().any(|c| c.status == HealthStatus::Degraded) {
            return HealthStatus::Degraded;
        }

        HealthStatus::Healthy
    }
}

/// Basic liveness check endpoint
///
/// Returns 200 OK if the service is alive; does not check external
/// dependencies.
pub async fn health_check() -> Response {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Service is running".to_string()),
        timestamp: Utc::now(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

/// Readiness check endpoint
///
/// Aggregates the registered component healths; unhealthy components flip
/// readiness to 503.
pub async fn ready_check(State(state): State<Arc<HealthState>>) -> Response {
    let status = state.get_status().await;
    let checks = state.components.read().await.clone();

    let response = ReadyResponse {
        status,
        checks,
        timestamp: Utc::now(),
    };

    (status.to_status_code(), Json(response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_state_is_healthy() {
        let state = HealthState::new();
        assert_eq!(state.get_status().await, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unhealthy_component_flips_status() {
        let state = HealthState::new();

        state
            .update_component("kafka_consumer", HealthStatus::Healthy, None)
            .await;
        assert_eq!(state.get_status().await, HealthStatus::Healthy);

        state
            .update_component(
                "kafka_consumer",
                HealthStatus::Unhealthy,
                Some("dead-letter publish failed".to_string()),
            )
            .await;
        assert_eq!(state.get_status().await, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_degraded_component() {
        let state = HealthState::new();
        state
            .update_component("kafka_producer", HealthStatus::Degraded, None)
            .await;
        assert_eq!(state.get_status().await, HealthStatus::Degraded);
    }
}
