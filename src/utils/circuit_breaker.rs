use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards a flaky downstream (the dead-letter producer) so that a broker
// outage turns into fast, logged drops instead of every call waiting out a
// full send timeout.
//
// States:
// - Closed: calls pass through, consecutive failures are counted
// - Open: calls are rejected until the cool-down elapses
// - HalfOpen: trial calls pass; enough successes close, any failure reopens
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before allowing a trial call
    pub cool_down: Duration,
    /// Trial successes needed to close from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Clone)]
pub struct CircuitBreaker {
    phase: Arc<Mutex<Phase>>,
    config: CircuitBreakerConfig,
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "Circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "Operation failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
            config,
        }
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        match operation.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        match *self.phase.lock().await {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether a call may proceed; moves Open to HalfOpen once cooled down.
    async fn admit(&self) -> bool {
        let mut phase = self.phase.lock().await;

        if let Phase::Open { since } = *phase {
            if since.elapsed() < self.config.cool_down {
                return false;
            }
            tracing::info!("Circuit breaker cool-down elapsed, allowing trial call");
            *phase = Phase::HalfOpen { successes: 0 };
        }

        true
    }

    async fn on_success(&self) {
        let mut phase = self.phase.lock().await;

        match *phase {
            Phase::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    tracing::info!(successes = successes, "Circuit breaker closing");
                    *phase = Phase::Closed { failures: 0 };
                } else {
                    *phase = Phase::HalfOpen { successes };
                }
            }
            Phase::Closed { .. } => *phase = Phase::Closed { failures: 0 },
            Phase::Open { .. } => {
                tracing::warn!("Success recorded while circuit is open");
            }
        }
    }

    async fn on_failure(&self) {
        let mut phase = self.phase.lock().await;

        match *phase {
            Phase::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures = failures, "Circuit breaker opening");
                    *phase = Phase::Open { since: Instant::now() };
                } else {
                    *phase = Phase::Closed { failures };
                }
            }
            Phase::HalfOpen { .. } => {
                tracing::warn!("Failure during half-open, reopening circuit");
                *phase = Phase::Open { since: Instant::now() };
            }
            Phase::Open { .. } => *phase = Phase::Open { since: Instant::now() },
        }
    }
}
