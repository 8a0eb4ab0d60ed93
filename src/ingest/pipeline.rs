use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::domain::order::{validate, Order};
use crate::metrics::{IngestOutcome, Metrics};
use crate::service::OrderService;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};
use super::dead_letter::{DeadLetter, DeadLetterReason, DeadLetterSink};

// ============================================================================
// Ingest Pipeline - Per-Message State Machine
// ============================================================================
//
// DECODE -> (malformed) -> DEAD-LETTER -> COMMIT
// DECODE -> VALIDATE -> (invalid) -> DEAD-LETTER -> COMMIT
// VALIDATE -> PERSIST -> (ok) -> COMMIT
// VALIDATE -> PERSIST -> (fails) -> REDELIVER
//                      -> (fails past redelivery limit) -> DEAD-LETTER -> COMMIT
//
// Persisting is retried in place with bounded exponential backoff before a
// redelivery is requested. An offset is only ever committed after the order
// is durably stored or the message has been handed to the dead-letter sink.
//
// The pipeline knows nothing about the transport; the consumer maps
// `Disposition` onto offset commits and seeks.
//
// ============================================================================

/// Where a message sits in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl StreamPosition {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// True if committing `committed` moves the group past this position.
    fn is_covered_by(&self, committed: &StreamPosition) -> bool {
        self.topic == committed.topic
            && self.partition == committed.partition
            && self.offset <= committed.offset
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.topic, self.partition, self.offset)
    }
}

/// What the consumer must do with the message's offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this message; commit past it.
    Commit,
    /// Not stored; fetch the same message again.
    Redeliver,
}

pub struct IngestPipeline {
    service: Arc<OrderService>,
    dead_letters: Arc<dyn DeadLetterSink>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
    max_redeliveries: u32,
    /// Failed deliveries per position that has not been committed yet
    failed_deliveries: HashMap<StreamPosition, u32>,
}

impl IngestPipeline {
    pub fn new(
        service: Arc<OrderService>,
        dead_letters: Arc<dyn DeadLetterSink>,
        metrics: Arc<Metrics>,
        retry: RetryConfig,
        max_redeliveries: u32,
    ) -> Self {
        Self {
            service,
            dead_letters,
            metrics,
            retry,
            max_redeliveries,
            failed_deliveries: HashMap::new(),
        }
    }

    /// True while some message is waiting to be redelivered after a store failure.
    pub fn is_persistence_failing(&self) -> bool {
        !self.failed_deliveries.is_empty()
    }

    /// Forget failed positions that `keep` rejects, e.g. partitions this
    /// consumer no longer owns. Their messages go to another group member.
    pub fn retain_pending(&mut self, mut keep: impl FnMut(&StreamPosition) -> bool) {
        self.failed_deliveries.retain(|position, _| keep(position));
    }

    pub async fn process(&mut self, position: &StreamPosition, payload: Option<&[u8]>) -> Disposition {
        let started = Instant::now();

        let (disposition, outcome) = self.handle(position, payload).await;

        self.metrics
            .record_ingest(outcome, started.elapsed().as_secs_f64());
        if disposition == Disposition::Commit {
            self.failed_deliveries
                .retain(|pending, _| !pending.is_covered_by(position));
        }

        disposition
    }

    async fn handle(
        &mut self,
        position: &StreamPosition,
        payload: Option<&[u8]>,
    ) -> (Disposition, IngestOutcome) {
        let payload = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                tracing::warn!(position = %position, "Message without payload, skipping");
                return (Disposition::Commit, IngestOutcome::Empty);
            }
        };

        let order = match Order::from_json(payload) {
            Ok(order) => order,
            Err(e) => {
                self.dead_letter(DeadLetterReason::Malformed, e.to_string(), position, payload);
                return (Disposition::Commit, IngestOutcome::Malformed);
            }
        };

        if let Err(e) = validate(&order) {
            self.dead_letter(DeadLetterReason::Invalid, e.to_string(), position, payload);
            return (Disposition::Commit, IngestOutcome::Invalid);
        }

        let service = Arc::clone(&self.service);
        let order_ref = &order;
        let result = retry_on_transient(&self.retry, |_attempt| {
            let service = Arc::clone(&service);
            async move { service.submit(order_ref).await }
        })
        .await;

        let (error, attempts) = match result {
            RetryResult::Success(()) => {
                tracing::info!(
                    order_uid = %order.order_uid,
                    position = %position,
                    item_count = order.items.len(),
                    "Order stored"
                );
                return (Disposition::Commit, IngestOutcome::Stored);
            }
            RetryResult::Failed { error, attempts } => (error, attempts),
            RetryResult::PermanentFailure(error) => (error, 1),
        };

        let failures = self.failed_deliveries.entry(position.clone()).or_insert(0);
        *failures += 1;
        let failures = *failures;

        if failures > self.max_redeliveries {
            let detail = format!("{} (failed {} deliveries)", error, failures);
            self.dead_letter(DeadLetterReason::PersistenceExhausted, detail, position, payload);
            return (Disposition::Commit, IngestOutcome::DeadLettered);
        }

        tracing::warn!(
            order_uid = %order.order_uid,
            position = %position,
            attempts = attempts,
            failures = failures,
            max_redeliveries = self.max_redeliveries,
            error = %error,
            "Failed to persist order, withholding commit for redelivery"
        );

        (Disposition::Redeliver, IngestOutcome::Redelivered)
    }

    fn dead_letter(&self, reason: DeadLetterReason, detail: String, position: &StreamPosition, payload: &[u8]) {
        tracing::warn!(
            position = %position,
            reason = reason.as_str(),
            detail = %detail,
            "Routing message to dead-letter topic"
        );

        self.metrics.record_dead_letter(reason.as_str());
        self.dead_letters
            .send(DeadLetter::new(reason, detail, payload, position.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::domain::order::value_objects::tests::sample_order;
    use crate::persistence::memory::{permanent_error, transient_error, InMemoryOrderRepository};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        letters: Mutex<Vec<DeadLetter>>,
    }

    impl RecordingSink {
        fn reasons(&self) -> Vec<DeadLetterReason> {
            self.letters.lock().unwrap().iter().map(|l| l.reason).collect()
        }
    }

    impl DeadLetterSink for RecordingSink {
        fn send(&self, letter: DeadLetter) {
            self.letters.lock().unwrap().push(letter);
        }
    }

    struct Harness {
        repo: Arc<InMemoryOrderRepository>,
        sink: Arc<RecordingSink>,
        service: Arc<OrderService>,
        pipeline: IngestPipeline,
    }

    fn harness(retry_attempts: u32, max_redeliveries: u32) -> Harness {
        let repo = Arc::new(InMemoryOrderRepository::new());
        let sink = Arc::new(RecordingSink::default());
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = OrderCache::new(100, Duration::from_secs(60)).unwrap();
        let service = Arc::new(OrderService::new(repo.clone(), cache, metrics.clone()));
        let retry = RetryConfig {
            max_attempts: retry_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let pipeline = IngestPipeline::new(service.clone(), sink.clone(), metrics, retry, max_redeliveries);

        Harness { repo, sink, service, pipeline }
    }

    fn at(offset: i64) -> StreamPosition {
        StreamPosition::new("orders", 0, offset)
    }

    fn encode(order: &Order) -> Vec<u8> {
        serde_json::to_vec(order).unwrap()
    }

    #[tokio::test]
    async fn test_valid_order_is_stored_and_committed() {
        let mut h = harness(3, 5);
        let payload = encode(&sample_order("A1"));

        let disposition = h.pipeline.process(&at(0), Some(&payload)).await;

        assert_eq!(disposition, Disposition::Commit);
        assert_eq!(h.repo.stored_count(), 1);
        assert!(h.service.cache().get("A1").await.is_some());
        assert!(h.sink.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_missing_payload_is_committed_without_dead_letter() {
        let mut h = harness(3, 5);

        assert_eq!(h.pipeline.process(&at(0), None).await, Disposition::Commit);
        assert_eq!(h.pipeline.process(&at(1), Some(b"")).await, Disposition::Commit);

        assert!(h.sink.reasons().is_empty());
        assert_eq!(h.repo.saves(), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dead_lettered_and_committed() {
        let mut h = harness(3, 5);
        let payload = b"{\"order_uid\": \"A1\", broken".to_vec();

        let disposition = h.pipeline.process(&at(7), Some(&payload)).await;

        assert_eq!(disposition, Disposition::Commit);
        assert_eq!(h.sink.reasons(), vec![DeadLetterReason::Malformed]);
        let letters = h.sink.letters.lock().unwrap();
        assert_eq!(letters[0].payload, payload);
        assert_eq!(letters[0].source, at(7));
        assert_eq!(h.repo.saves(), 0);
    }

    #[tokio::test]
    async fn test_invalid_order_never_reaches_the_store() {
        let mut h = harness(3, 5);
        let mut order = sample_order("A1");
        order.items.clear();

        let disposition = h.pipeline.process(&at(0), Some(&encode(&order))).await;

        assert_eq!(disposition, Disposition::Commit);
        assert_eq!(h.sink.reasons(), vec![DeadLetterReason::Invalid]);
        assert_eq!(h.repo.saves(), 0);
        assert!(h.service.cache().get("A1").await.is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_in_place() {
        let mut h = harness(3, 5);
        h.repo.fail_next_saves([transient_error(), transient_error()]);

        let disposition = h.pipeline.process(&at(0), Some(&encode(&sample_order("A1")))).await;

        assert_eq!(disposition, Disposition::Commit);
        assert_eq!(h.repo.saves(), 3);
        assert_eq!(h.repo.stored_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_then_success_on_redelivery_stores_once() {
        let mut h = harness(1, 5);
        let payload = encode(&sample_order("A1"));
        h.repo.fail_next_saves([transient_error()]);

        let first = h.pipeline.process(&at(3), Some(&payload)).await;
        assert_eq!(first, Disposition::Redeliver);
        assert!(h.pipeline.is_persistence_failing());
        assert!(h.service.cache().get("A1").await.is_none());

        let second = h.pipeline.process(&at(3), Some(&payload)).await;

        assert_eq!(second, Disposition::Commit);
        assert!(!h.pipeline.is_persistence_failing());
        assert_eq!(h.repo.stored_count(), 1);
        assert!(h.sink.reasons().is_empty());
    }

    #[tokio::test]
    async fn test_exceeding_redelivery_limit_dead_letters() {
        let mut h = harness(1, 2);
        let payload = encode(&sample_order("A1"));
        h.repo.fail_next_saves([permanent_error(), permanent_error(), permanent_error()]);

        assert_eq!(h.pipeline.process(&at(0), Some(&payload)).await, Disposition::Redeliver);
        assert_eq!(h.pipeline.process(&at(0), Some(&payload)).await, Disposition::Redeliver);
        assert_eq!(h.pipeline.process(&at(0), Some(&payload)).await, Disposition::Commit);

        assert_eq!(h.sink.reasons(), vec![DeadLetterReason::PersistenceExhausted]);
        assert_eq!(h.repo.stored_count(), 0);
        assert!(!h.pipeline.is_persistence_failing());
    }

    #[tokio::test]
    async fn test_commit_clears_failures_behind_it_on_the_same_partition() {
        let mut h = harness(1, 5);
        h.repo.fail_next_saves([transient_error(), transient_error()]);

        let stale = StreamPosition::new("orders", 0, 0);
        let other_partition = StreamPosition::new("orders", 1, 0);
        assert_eq!(
            h.pipeline.process(&stale, Some(&encode(&sample_order("A1")))).await,
            Disposition::Redeliver
        );
        assert_eq!(
            h.pipeline.process(&other_partition, Some(&encode(&sample_order("B1")))).await,
            Disposition::Redeliver
        );

        let later = StreamPosition::new("orders", 0, 2);
        assert_eq!(
            h.pipeline.process(&later, Some(&encode(&sample_order("C1")))).await,
            Disposition::Commit
        );
        assert!(h.pipeline.is_persistence_failing());

        h.pipeline.retain_pending(|position| position.partition != 1);
        assert!(!h.pipeline.is_persistence_failing());
    }

    #[tokio::test]
    async fn test_order_scenario_end_to_end() {
        let mut h = harness(3, 5);
        let mut order = sample_order("A1");
        order.items[0].chrt_id = 7;
        order.items[0].name = "X".to_string();
        order.delivery.email = "a@b.com".to_string();
        order.payment.amount = 10;
        let payload = encode(&order);

        assert_eq!(h.pipeline.process(&at(0), Some(&payload)).await, Disposition::Commit);
        assert_eq!(h.service.get_by_uid("A1").await.unwrap(), order);

        // Identical redelivery is a no-op.
        assert_eq!(h.pipeline.process(&at(1), Some(&payload)).await, Disposition::Commit);
        assert_eq!(h.repo.stored_count(), 1);
        assert_eq!(h.repo.stored("A1"), Some(order.clone()));

        // No items: rejected before persistence.
        let mut empty = order.clone();
        empty.order_uid = "A2".to_string();
        empty.items.clear();
        assert_eq!(h.pipeline.process(&at(2), Some(&encode(&empty))).await, Disposition::Commit);
        assert_eq!(h.sink.reasons(), vec![DeadLetterReason::Invalid]);
        assert!(h.repo.stored("A2").is_none());
    }
}
