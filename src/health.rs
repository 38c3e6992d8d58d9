//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

use crate::database::repository::PaymentStore;
use crate::payments::circuit_breaker::{CircuitBreaker, CircuitState};

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    fn record(&mut self, component: &str, health: ComponentHealth) {
        let degraded = match health.status {
            ComponentState::Up => None,
            ComponentState::Warning => Some(HealthState::Degraded),
            ComponentState::Down => Some(HealthState::Unhealthy),
        };
        match (self.status, degraded) {
            (_, Some(HealthState::Unhealthy)) => self.status = HealthState::Unhealthy,
            (HealthState::Healthy, Some(state)) => self.status = state,
            _ => {}
        }
        self.checks.insert(component.to_string(), health);
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PaymentStore>,
    breaker: Arc<CircuitBreaker>,
    probe_timeout: Duration,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn PaymentStore>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            store,
            breaker,
            probe_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        health_status.record("store", self.check_store().await);
        health_status.record("gateway", self.check_gateway());

        health_status
    }

    async fn check_store(&self) -> ComponentHealth {
        let backend = self.store.backend();
        let started = Instant::now();
        match timeout(self.probe_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                let response_time = started.elapsed().as_millis();
                info!(backend, response_time_ms = response_time as u64, "Store health check: OK");
                ComponentHealth::up(Some(response_time))
            }
            Ok(Err(e)) => {
                error!(backend, error = %e, "Store health check failed");
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!(backend, "Store health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        }
    }

    /// An open breaker degrades the service; it does not make it unhealthy
    /// since reads and webhooks still work.
    fn check_gateway(&self) -> ComponentHealth {
        let snapshot = self.breaker.snapshot();
        match snapshot.state {
            CircuitState::Closed => ComponentHealth::up(None),
            state => {
                warn!(
                    gateway = %snapshot.name,
                    circuit_state = %state,
                    consecutive_failures = snapshot.consecutive_failures,
                    "Gateway circuit not closed"
                );
                ComponentHealth::warning(
                    None,
                    Some(format!("{} circuit is {}", snapshot.name, state)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory_store::InMemoryPaymentStore;
    use crate::payments::circuit_breaker::CircuitBreakerConfig;
    use crate::payments::error::GatewayError;

    fn checker(breaker: Arc<CircuitBreaker>) -> HealthChecker {
        HealthChecker::new(Arc::new(InMemoryPaymentStore::new()), breaker)
    }

    #[test]
    fn test_health_status_creation() {
        let status = HealthStatus::new();
        assert!(status.is_healthy());
        assert!(status.checks.is_empty());
    }

    #[test]
    fn test_component_health_states() {
        let mut status = HealthStatus::new();
        status.record("a", ComponentHealth::warning(None, None));
        assert_eq!(status.status, HealthState::Degraded);

        status.record("b", ComponentHealth::down(Some("gone".to_string())));
        assert_eq!(status.status, HealthState::Unhealthy);

        status.record("c", ComponentHealth::up(Some(1)));
        assert_eq!(status.status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_healthy_with_memory_store_and_closed_breaker() {
        let breaker = Arc::new(CircuitBreaker::new("mock", CircuitBreakerConfig::default()));
        let status = checker(breaker).check_health().await;

        assert!(status.is_healthy());
        assert_eq!(status.checks["store"].status, ComponentState::Up);
        assert_eq!(status.checks["gateway"].status, ComponentState::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_degrades() {
        let breaker = Arc::new(CircuitBreaker::new(
            "mock",
            CircuitBreakerConfig {
                failure_threshold: 0,
                ..CircuitBreakerConfig::default()
            },
        ));
        let _ = breaker
            .call(async {
                Err::<(), _>(GatewayError::Server {
                    status: 500,
                    message: "boom".to_string(),
                })
            })
            .await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let status = checker(breaker).check_health().await;
        assert_eq!(status.status, HealthState::Degraded);
        assert_eq!(status.checks["gateway"].status, ComponentState::Warning);
    }
}
