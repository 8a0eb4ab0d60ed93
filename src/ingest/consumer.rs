use std::time::Duration;

use actix::Addr;
use anyhow::{Context, Result};
use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::RDKafkaErrorCode,
    Message, Offset, TopicPartitionList,
};
use tokio::sync::watch;

use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth};
use crate::config::KafkaConfig;
use super::pipeline::{Disposition, IngestPipeline, StreamPosition};

// ============================================================================
// Order Consumer - Kafka Transport for the Ingest Pipeline
// ============================================================================
//
// Offsets are committed manually, one message at a time, and only after the
// pipeline says the message is done. A message the pipeline wants redelivered
// is re-fetched by seeking its partition back to the same offset. If the seek
// fails, the message is held and reprocessed in place; nothing past it is
// fetched until it commits.
//
// Shutdown is only observed between messages and while a held message waits.
// An interrupted message is left uncommitted and is fetched again on restart.
//
// ============================================================================

const HEALTH_COMPONENT: &str = "ingest_consumer";
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const REDELIVERY_PAUSE: Duration = Duration::from_millis(500);
const FETCH_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Create the ingest and dead-letter topics unless they already exist.
pub async fn ensure_topics(config: &KafkaConfig) -> Result<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", config.bootstrap_servers())
        .create()
        .context("Failed to create Kafka admin client")?;

    let topics = [&config.topic, &config.dlq_topic].map(|name| {
        NewTopic::new(
            name,
            config.topic_partitions,
            TopicReplication::Fixed(config.topic_replication),
        )
    });
    let options = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

    let results = admin
        .create_topics(&topics, &options)
        .await
        .context("Failed to create Kafka topics")?;

    for result in results {
        match result {
            Ok(topic) => tracing::info!(topic = %topic, "Created topic"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                tracing::debug!(topic = %topic, "Topic already exists");
            }
            Err((topic, code)) => anyhow::bail!("Failed to create topic {}: {}", topic, code),
        }
    }

    Ok(())
}

pub struct OrderConsumer {
    consumer: StreamConsumer,
    topic: String,
    pipeline: IngestPipeline,
    health: Option<Addr<HealthMonitorActor>>,
    reported: Option<HealthStatus>,
}

/// Offset side effects of a disposition.
trait OffsetControl {
    fn commit(&self, position: &StreamPosition);

    /// Move the partition back to `position`. False if that failed.
    fn rewind(&self, position: &StreamPosition) -> bool;
}

impl OffsetControl for StreamConsumer {
    fn commit(&self, position: &StreamPosition) {
        let mut tpl = TopicPartitionList::new();
        let result = tpl
            .add_partition_offset(&position.topic, position.partition, Offset::Offset(position.offset + 1))
            .and_then(|_| Consumer::commit(self, &tpl, CommitMode::Async));

        match result {
            Ok(()) => tracing::debug!(position = %position, "Committed offset"),
            // The message will be seen again after a restart; the store absorbs it.
            Err(e) => tracing::error!(position = %position, error = %e, "Failed to commit offset"),
        }
    }

    fn rewind(&self, position: &StreamPosition) -> bool {
        let result = self.seek(
            &position.topic,
            position.partition,
            Offset::Offset(position.offset),
            SEEK_TIMEOUT,
        );

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(position = %position, error = %e, "Failed to seek back for redelivery");
                false
            }
        }
    }
}

/// Run one fetched message until its offset is committed or handed back to
/// the broker. Returns early, uncommitted, only on shutdown.
async fn settle(
    pipeline: &mut IngestPipeline,
    offsets: &impl OffsetControl,
    position: &StreamPosition,
    payload: Option<&[u8]>,
    shutdown: &watch::Receiver<bool>,
    pause: Duration,
) {
    loop {
        match pipeline.process(position, payload).await {
            Disposition::Commit => {
                offsets.commit(position);
                return;
            }
            Disposition::Redeliver => {
                let rewound = offsets.rewind(position);
                tokio::time::sleep(pause).await;

                if rewound || *shutdown.borrow() {
                    return;
                }
                tracing::warn!(position = %position, "Holding message for in-place redelivery");
            }
        }
    }
}

impl OrderConsumer {
    /// Create the consumer and join the group on the ingest topic.
    pub fn new(config: &KafkaConfig, pipeline: IngestPipeline) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.bootstrap_servers())
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .context("Failed to create Kafka consumer")?;

        consumer
            .subscribe(&[config.topic.as_str()])
            .with_context(|| format!("Failed to subscribe to {}", config.topic))?;

        tracing::info!(
            topic = %config.topic,
            group_id = %config.group_id,
            brokers = %config.bootstrap_servers(),
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            pipeline,
            health: None,
            reported: None,
        })
    }

    pub fn with_health_monitor(mut self, health: Addr<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    /// Fetch and process until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(topic = %self.topic, "🚀 Order consumer started");
        self.report(HealthStatus::Healthy);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                fetched = self.consumer.recv() => {
                    let fetched = fetched.map(|message| {
                        (
                            StreamPosition::new(message.topic(), message.partition(), message.offset()),
                            message.payload().map(<[u8]>::to_vec),
                        )
                    });

                    match fetched {
                        Ok((position, payload)) => self.handle(position, payload, &shutdown).await,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to fetch message");
                            self.report(HealthStatus::Degraded(format!("fetch failed: {}", e)));
                            tokio::time::sleep(FETCH_ERROR_PAUSE).await;
                        }
                    }
                }
            }
        }

        self.consumer.unsubscribe();
        self.report(HealthStatus::Unhealthy("consumer stopped".to_string()));
        tracing::info!(topic = %self.topic, "🛑 Order consumer stopped");
    }

    async fn handle(
        &mut self,
        position: StreamPosition,
        payload: Option<Vec<u8>>,
        shutdown: &watch::Receiver<bool>,
    ) {
        tracing::debug!(position = %position, "Fetched message");

        settle(
            &mut self.pipeline,
            &self.consumer,
            &position,
            payload.as_deref(),
            shutdown,
            REDELIVERY_PAUSE,
        )
        .await;
        self.forget_revoked();

        if self.pipeline.is_persistence_failing() {
            self.report(HealthStatus::Degraded(
                "store unavailable, withholding commits".to_string(),
            ));
        } else {
            self.report(HealthStatus::Healthy);
        }
    }

    /// Failed positions on partitions revoked by a rebalance will not come back here.
    fn forget_revoked(&mut self) {
        if !self.pipeline.is_persistence_failing() {
            return;
        }

        match self.consumer.assignment() {
            Ok(assigned) => self.pipeline.retain_pending(|position| {
                assigned
                    .find_partition(&position.topic, position.partition)
                    .is_some()
            }),
            Err(e) => tracing::warn!(error = %e, "Failed to read partition assignment"),
        }
    }

    /// Forward health changes to the monitor; repeated states are not resent.
    fn report(&mut self, status: HealthStatus) {
        if self.reported.as_ref() == Some(&status) {
            return;
        }

        if let Some(health) = &self.health {
            health.do_send(UpdateHealth {
                component: HEALTH_COMPONENT.to_string(),
                status: status.clone(),
                details: None,
            });
        }
        self.reported = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::domain::order::value_objects::tests::sample_order;
    use crate::ingest::{DeadLetter, DeadLetterSink};
    use crate::metrics::Metrics;
    use crate::persistence::memory::{permanent_error, transient_error, InMemoryOrderRepository};
    use crate::service::OrderService;
    use crate::utils::RetryConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingSink {
        sent: AtomicUsize,
    }

    impl DeadLetterSink for CountingSink {
        fn send(&self, _letter: DeadLetter) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordedOffsets {
        seek_succeeds: bool,
        commits: Mutex<Vec<i64>>,
        rewinds: Mutex<Vec<i64>>,
    }

    impl RecordedOffsets {
        fn new(seek_succeeds: bool) -> Self {
            Self {
                seek_succeeds,
                commits: Mutex::new(Vec::new()),
                rewinds: Mutex::new(Vec::new()),
            }
        }

        fn commits(&self) -> Vec<i64> {
            self.commits.lock().unwrap().clone()
        }

        fn rewinds(&self) -> Vec<i64> {
            self.rewinds.lock().unwrap().clone()
        }
    }

    impl OffsetControl for RecordedOffsets {
        fn commit(&self, position: &StreamPosition) {
            self.commits.lock().unwrap().push(position.offset);
        }

        fn rewind(&self, position: &StreamPosition) -> bool {
            self.rewinds.lock().unwrap().push(position.offset);
            self.seek_succeeds
        }
    }

    fn pipeline(repo: Arc<InMemoryOrderRepository>, sink: Arc<CountingSink>, max_redeliveries: u32) -> IngestPipeline {
        let metrics = Arc::new(Metrics::new().unwrap());
        let cache = OrderCache::new(10, Duration::from_secs(60)).unwrap();
        let service = Arc::new(OrderService::new(repo, cache, metrics.clone()));
        let retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        };
        IngestPipeline::new(service, sink, metrics, retry, max_redeliveries)
    }

    fn payload() -> Vec<u8> {
        serde_json::to_vec(&sample_order("A1")).unwrap()
    }

    #[tokio::test]
    async fn test_failed_seek_holds_message_until_stored() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.fail_next_saves([transient_error()]);
        let mut pipeline = pipeline(repo.clone(), Arc::default(), 5);
        let offsets = RecordedOffsets::new(false);
        let (_tx, shutdown) = watch::channel(false);
        let position = StreamPosition::new("orders", 0, 0);

        settle(&mut pipeline, &offsets, &position, Some(&payload()), &shutdown, Duration::ZERO).await;

        assert_eq!(offsets.rewinds(), vec![0]);
        assert_eq!(offsets.commits(), vec![0]);
        assert!(repo.stored("A1").is_some());
        assert!(!pipeline.is_persistence_failing());
    }

    #[tokio::test]
    async fn test_successful_seek_leaves_redelivery_to_the_broker() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.fail_next_saves([transient_error()]);
        let mut pipeline = pipeline(repo.clone(), Arc::default(), 5);
        let offsets = RecordedOffsets::new(true);
        let (_tx, shutdown) = watch::channel(false);
        let position = StreamPosition::new("orders", 0, 4);

        settle(&mut pipeline, &offsets, &position, Some(&payload()), &shutdown, Duration::ZERO).await;

        assert_eq!(offsets.rewinds(), vec![4]);
        assert!(offsets.commits().is_empty());
        assert_eq!(repo.saves(), 1);
        assert!(pipeline.is_persistence_failing());
    }

    #[tokio::test]
    async fn test_held_message_is_dead_lettered_past_redelivery_limit() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.fail_next_saves([permanent_error(), permanent_error(), permanent_error()]);
        let sink = Arc::new(CountingSink::default());
        let mut pipeline = pipeline(repo.clone(), sink.clone(), 2);
        let offsets = RecordedOffsets::new(false);
        let (_tx, shutdown) = watch::channel(false);
        let position = StreamPosition::new("orders", 0, 0);

        settle(&mut pipeline, &offsets, &position, Some(&payload()), &shutdown, Duration::ZERO).await;

        assert_eq!(offsets.rewinds(), vec![0, 0]);
        assert_eq!(offsets.commits(), vec![0]);
        assert_eq!(sink.sent.load(Ordering::SeqCst), 1);
        assert_eq!(repo.stored_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_held_message_uncommitted() {
        let repo = Arc::new(InMemoryOrderRepository::new());
        repo.fail_next_saves([transient_error(), transient_error()]);
        let mut pipeline = pipeline(repo.clone(), Arc::default(), 5);
        let offsets = RecordedOffsets::new(false);
        let (tx, shutdown) = watch::channel(false);
        tx.send(true).unwrap();
        let position = StreamPosition::new("orders", 0, 0);

        settle(&mut pipeline, &offsets, &position, Some(&payload()), &shutdown, Duration::ZERO).await;

        assert!(offsets.commits().is_empty());
        assert_eq!(repo.saves(), 1);
        assert!(repo.stored("A1").is_none());
    }
}
