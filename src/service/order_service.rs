use std::sync::Arc;

use crate::cache::OrderCache;
use crate::domain::order::Order;
use crate::metrics::Metrics;
use crate::persistence::{OrderRepository, StoreError};

// ============================================================================
// Order Service - Cache-Aside Read/Write Path
// ============================================================================
//
// Writes go to the store first; the cache is populated only with what the
// store holds afterwards, so a redelivered or conflicting aggregate can never
// make the cache disagree with the store (first write wins in both).
//
// Reads are served from the cache when possible and fall back to the store,
// populating the cache on the way out.
//
// ============================================================================

pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    cache: OrderCache,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, cache: OrderCache, metrics: Arc<Metrics>) -> Self {
        Self { repo, cache, metrics }
    }

    #[cfg(test)]
    pub fn cache(&self) -> &OrderCache {
        &self.cache
    }

    /// Persist an order, then cache the stored aggregate.
    ///
    /// On error the cache is left untouched and the error is returned as is.
    pub async fn submit(&self, order: &Order) -> Result<(), StoreError> {
        self.repo.save(order).await?;

        let stored = self.repo.get(&order.order_uid).await?;
        self.cache.set(stored).await;

        Ok(())
    }

    pub async fn get_by_uid(&self, order_uid: &str) -> Result<Order, StoreError> {
        if let Some(order) = self.cache.get(order_uid).await {
            self.metrics.record_cache_lookup(true);
            tracing::debug!(order_uid = %order_uid, "Cache hit");
            return Ok(order);
        }

        self.metrics.record_cache_lookup(false);
        tracing::debug!(order_uid = %order_uid, "Cache miss, reading from store");

        let order = self.repo.get(order_uid).await?;
        self.cache.set(order.clone()).await;

        Ok(order)
    }

    /// Warm the cache from the store. Orders whose items cannot be loaded are
    /// skipped. Returns the number of cached orders.
    pub async fn restore_cache(&self) -> Result<usize, StoreError> {
        let orders = self.repo.get_all().await?;
        let total = orders.len();
        let mut restored = 0;

        for mut order in orders {
            match self.repo.get_items(&order.order_uid).await {
                Ok(items) => {
                    order.items = items;
                    self.cache.set(order).await;
                    restored += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        order_uid = %order.order_uid,
                        error = %e,
                        "Skipping order during cache restore"
                    );
                }
            }
        }

        self.metrics.set_restored_orders(restored);
        tracing::info!(restored = restored, total = total, "Cache restored from store");

        Ok(restored)
    }
}
