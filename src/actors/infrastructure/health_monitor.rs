use actix::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::messaging::RedpandaClient;
use crate::metrics::Metrics;
use crate::utils::CircuitState;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track health status reported by components (consumer, publisher)
// - Poll the dead-letter publisher's circuit breaker
// - Aggregate system-wide health for the /health endpoint
//
// ============================================================================

pub const DEAD_LETTER_PUBLISHER: &str = "dead_letter_publisher";

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    redpanda: Option<Arc<RedpandaClient>>,
    metrics: Option<Arc<Metrics>>,
    check_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
            redpanda: None,
            metrics: None,
            check_interval: Duration::from_secs(10),
        }
    }

    /// Poll this client's circuit breaker on every check interval.
    pub fn watch_publisher(mut self, redpanda: Arc<RedpandaClient>, metrics: Arc<Metrics>) -> Self {
        self.redpanda = Some(redpanda);
        self.metrics = Some(metrics);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Default for HealthMonitorActor {
    fn default() -> Self {
        Self::new()
    }
}

fn circuit_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
        CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(interval_secs = self.check_interval.as_secs(), "HealthMonitorActor started");

        let addr = ctx.address();

        ctx.run_interval(self.check_interval, move |act, _ctx| {
            let Some(redpanda) = act.redpanda.clone() else {
                return;
            };
            let metrics = act.metrics.clone();
            let addr = addr.clone();

            actix::spawn(async move {
                let state = redpanda.circuit_state().await;
                if let Some(metrics) = metrics {
                    metrics.update_circuit_breaker_state(state);
                }

                addr.do_send(UpdateHealth {
                    component: DEAD_LETTER_PUBLISHER.to_string(),
                    status: circuit_health(state),
                    details: None,
                });
            });
        });
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        if self.components.get(&msg.component).map(|h| &h.status) != Some(&msg.status) {
            tracing::info!(
                component = %msg.component,
                status = msg.status.label(),
                reason = msg.status.reason().unwrap_or(""),
                "Component health changed"
            );
        }

        let health = ComponentHealth::new(msg.status).with_details(msg.details);
        self.components.insert(msg.component, health);
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        let overall_status = self.compute_overall_status();

        MessageResult(SystemHealth {
            overall_status,
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
