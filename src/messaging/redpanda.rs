use std::time::Duration;

use anyhow::Result;
use rdkafka::{
    config::ClientConfig,
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};

use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda / Kafka Producer
// ============================================================================
//
// Thin producer used for dead letters. Every send goes through a circuit
// breaker: while the broker is unreachable, publishes fail immediately
// instead of each one waiting out the delivery timeout.
//
// ============================================================================

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaClient {
    pub fn new(brokers: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(cb_config),
        })
    }

    /// Publish an unkeyed record carrying `payload` verbatim plus headers.
    pub async fn publish(&self, topic: &str, payload: &[u8], headers: &[(&str, String)]) -> Result<()> {
        let result = self
            .circuit_breaker
            .call(async {
                let owned_headers = headers.iter().fold(OwnedHeaders::new(), |acc, (key, value)| {
                    acc.insert(Header {
                        key: *key,
                        value: Some(value.as_str()),
                    })
                });

                let record = FutureRecord::<(), [u8]>::to(topic)
                    .payload(payload)
                    .headers(owned_headers);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| anyhow::anyhow!("Kafka send error: {}", e))
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %topic, bytes = payload.len(), "Published to Redpanda");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %topic, "Circuit breaker open - Redpanda unavailable");
                Err(anyhow::anyhow!("Circuit breaker open for Redpanda"))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, topic = %topic, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    /// Block until queued records are delivered or `timeout` elapses.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(Timeout::After(timeout))?;
        Ok(())
    }
}
