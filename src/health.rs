use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::app::AppContext;
use crate::clock::Clock;
use crate::subscriptions::SchedulerHeartbeat;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

/// Trait for implementing health checks
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>>;
}

/// Reports `Degraded` when the lifecycle scheduler has not completed a tick
/// within two intervals.
pub struct SchedulerHealthCheck {
    heartbeat: SchedulerHeartbeat,
    clock: Arc<dyn Clock>,
    interval: Option<Duration>,
}

impl SchedulerHealthCheck {
    /// `interval` is `None` when the scheduler does not run in this process.
    pub fn new(
        heartbeat: SchedulerHeartbeat,
        clock: Arc<dyn Clock>,
        interval: Option<Duration>,
    ) -> Self {
        Self {
            heartbeat,
            clock,
            interval,
        }
    }

    fn evaluate(&self) -> ComponentHealth {
        let (status, message) = match (self.interval, self.heartbeat.last_tick()) {
            (None, _) => (HealthStatus::Healthy, "Scheduler disabled".to_string()),
            (Some(_), None) => (HealthStatus::Degraded, "No tick completed yet".to_string()),
            (Some(interval), Some(last_tick)) => {
                let allowed = chrono::Duration::from_std(interval * 2)
                    .unwrap_or(chrono::Duration::MAX);
                let age = self.clock.now() - last_tick;
                if age > allowed {
                    (
                        HealthStatus::Degraded,
                        format!("Last tick at {last_tick} is overdue"),
                    )
                } else {
                    (HealthStatus::Healthy, format!("Last tick at {last_tick}"))
                }
            }
        };

        ComponentHealth {
            name: self.name().to_string(),
            status,
            message: Some(message),
        }
    }
}

impl HealthCheck for SchedulerHealthCheck {
    fn name(&self) -> &str {
        "scheduler"
    }

    fn check(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ComponentHealth> + Send + '_>> {
        Box::pin(async move { self.evaluate() })
    }
}

/// Health check manager that runs all registered checks
#[derive(Default)]
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

/// Handler for the health endpoint
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    HealthChecker::new()
        .with_check(Arc::new(SchedulerHealthCheck::new(
            ctx.heartbeat.clone(),
            ctx.clock.clone(),
            ctx.scheduler_interval,
        )))
        .check_health()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn disabled_scheduler_is_healthy() {
        let check = SchedulerHealthCheck::new(SchedulerHeartbeat::new(), Arc::new(clock()), None);
        assert_eq!(check.check().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn stale_heartbeat_degrades() {
        let clock = clock();
        let ctx = AppContext::builder()
            .with_clock(Arc::new(clock.clone()))
            .with_scheduler_interval(Duration::from_secs(60))
            .build();

        let checker = HealthChecker::new().with_check(Arc::new(SchedulerHealthCheck::new(
            ctx.heartbeat.clone(),
            ctx.clock.clone(),
            ctx.scheduler_interval,
        )));
        assert_eq!(checker.check_health().await.status, HealthStatus::Degraded);

        ctx.scheduler().run_tick().await;
        assert_eq!(checker.check_health().await.status, HealthStatus::Healthy);

        clock.advance(chrono::Duration::seconds(121));
        let response = checker.check_health().await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks[0].name, "scheduler");
    }
}
