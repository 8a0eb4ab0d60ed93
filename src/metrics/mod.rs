use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::utils::CircuitState;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Ingestion outcomes and per-message processing latency
// - Dead-letter publications by reason
// - Cache hit/miss ratio and warm-up size
// - Dead-letter publisher circuit breaker state
//
// All metrics are registered with one Registry and scraped via /metrics
// ============================================================================

/// Terminal outcome of one consumed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored,
    Empty,
    Malformed,
    Invalid,
    Redelivered,
    DeadLettered,
}

impl IngestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestOutcome::Stored => "stored",
            IngestOutcome::Empty => "empty",
            IngestOutcome::Malformed => "malformed",
            IngestOutcome::Invalid => "invalid",
            IngestOutcome::Redelivered => "redelivered",
            IngestOutcome::DeadLettered => "dead_lettered",
        }
    }
}

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub ingest_messages: IntCounterVec,
    pub ingest_processing_duration: Histogram,

    // Dead letters
    pub dlq_messages: IntCounterVec,

    // Cache
    pub cache_requests: IntCounterVec,
    pub cache_restored_orders: IntGauge,

    // Circuit breaker
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingest_messages = IntCounterVec::new(
            Opts::new("ingest_messages_total", "Consumed order messages by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_messages.clone()))?;

        let ingest_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ingest_processing_duration_seconds",
                "Time from fetch to disposition for one message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(ingest_processing_duration.clone()))?;

        let dlq_messages = IntCounterVec::new(
            Opts::new("dlq_messages_total", "Messages routed to the dead-letter topic"),
            &["reason"],
        )?;
        registry.register(Box::new(dlq_messages.clone()))?;

        let cache_requests = IntCounterVec::new(
            Opts::new("cache_requests_total", "Order lookups by cache result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_requests.clone()))?;

        let cache_restored_orders = IntGauge::new(
            "cache_restored_orders",
            "Orders loaded into the cache at startup",
        )?;
        registry.register(Box::new(cache_restored_orders.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Dead-letter publisher circuit state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            ingest_messages,
            ingest_processing_duration,
            dlq_messages,
            cache_requests,
            cache_restored_orders,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode_text(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn record_ingest(&self, outcome: IngestOutcome, duration_secs: f64) {
        self.ingest_messages.with_label_values(&[outcome.as_str()]).inc();
        self.ingest_processing_duration.observe(duration_secs);
    }

    pub fn record_dead_letter(&self, reason: &str) {
        self.dlq_messages.with_label_values(&[reason]).inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_requests.with_label_values(&[result]).inc();
    }

    pub fn set_restored_orders(&self, count: usize) {
        self.cache_restored_orders.set(count as i64);
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.set(value);
    }
}
