use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::domain::order::Order;
use super::lru::{CacheError, LruTtlCache};

/// Shared, bounded order cache keyed by `order_uid`.
///
/// Cloning is cheap; every clone sees the same entries. Each operation holds
/// the lock for its whole duration, so the map and recency list never
/// diverge under concurrent readers and the ingest writer.
#[derive(Clone)]
pub struct OrderCache {
    inner: Arc<Mutex<LruTtlCache<String, Order>>>,
}

impl OrderCache {
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self, CacheError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(LruTtlCache::new(capacity, ttl)?)),
        })
    }

    pub async fn set(&self, order: Order) {
        let order_uid = order.order_uid.clone();
        let evicted = self.inner.lock().await.insert(order_uid.clone(), order);

        if let Some((evicted_uid, _)) = evicted {
            tracing::debug!(
                order_uid = %order_uid,
                evicted = %evicted_uid,
                "Cache full, evicted least recently used order"
            );
        }
    }

    pub async fn get(&self, order_uid: &str) -> Option<Order> {
        self.inner.lock().await.get(order_uid).cloned()
    }

    pub async fn purge_expired(&self) -> usize {
        self.inner.lock().await.purge_expired()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Periodically drop expired entries until shutdown is signalled.
    pub fn spawn_sweeper(&self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(interval_secs = every.as_secs(), "Cache sweeper started");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired().await;
                        if purged > 0 {
                            let remaining = cache.len().await;
                            tracing::debug!(
                                purged = purged,
                                remaining = remaining,
                                "Swept expired cache entries"
                            );
                        }
                    }
                }
            }

            tracing::info!("Cache sweeper stopped");
        })
    }
}
