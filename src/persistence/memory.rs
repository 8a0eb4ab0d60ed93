use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::order::{Item, Order};
use super::repository::{OrderRepository, StoreError};

// ============================================================================
// In-Memory Order Repository (test double)
// ============================================================================
//
// Mirrors the PostgreSQL store: the first saved aggregate per order_uid wins
// as a whole (order, delivery, payment and items), later saves are no-ops even
// when their items differ. Failures can be queued per operation and every call
// is counted.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<String, Order>>,
    save_failures: Mutex<VecDeque<StoreError>>,
    get_failures: Mutex<VecDeque<StoreError>>,
    items_failures: Mutex<HashMap<String, StoreError>>,
    get_all_failure: Mutex<Option<StoreError>>,
    pub save_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub get_items_calls: AtomicUsize,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `save` calls, one queued error each.
    pub fn fail_next_saves(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.save_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_next_get(&self, error: StoreError) {
        self.get_failures.lock().unwrap().push_back(error);
    }

    /// Fail every `get_items` call for one order.
    pub fn fail_items_for(&self, order_uid: &str, error: StoreError) {
        self.items_failures
            .lock()
            .unwrap()
            .insert(order_uid.to_string(), error);
    }

    pub fn fail_get_all(&self, error: StoreError) {
        *self.get_all_failure.lock().unwrap() = Some(error);
    }

    pub fn stored_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(order_uid).cloned()
    }

    pub fn saves(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

/// Stand-in for an error a driver cannot retry its way out of.
pub fn permanent_error() -> StoreError {
    StoreError::Database(sqlx::Error::ColumnNotFound("order_uid".to_string()))
}

/// Stand-in for a dropped connection / exhausted pool.
pub fn transient_error() -> StoreError {
    StoreError::Database(sqlx::Error::PoolTimedOut)
}

fn clone_error(err: &StoreError) -> StoreError {
    match err {
        StoreError::NotFound(uid) => StoreError::NotFound(uid.clone()),
        StoreError::Database(sqlx::Error::PoolTimedOut) => transient_error(),
        StoreError::Database(_) => permanent_error(),
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.save_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        // Duplicate catalog ids within one order collapse onto the first,
        // like the (order_uid, chrt_id) key does.
        let mut stored = order.clone();
        let mut seen = std::collections::HashSet::new();
        stored.items.retain(|item| seen.insert(item.chrt_id));

        self.orders
            .lock()
            .unwrap()
            .entry(order.order_uid.clone())
            .or_insert(stored);

        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.get_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut order = self
            .orders
            .lock()
            .unwrap()
            .get(order_uid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;
        order.items = self.get_items(order_uid).await?;

        Ok(order)
    }

    async fn get_items(&self, order_uid: &str) -> Result<Vec<Item>, StoreError> {
        self.get_items_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.items_failures.lock().unwrap().get(order_uid) {
            return Err(clone_error(err));
        }

        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(order_uid)
            .map(|order| order.items.clone())
            .unwrap_or_default())
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        if let Some(err) = self.get_all_failure.lock().unwrap().take() {
            return Err(err);
        }

        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .values()
            .cloned()
            .map(|mut order| {
                order.items.clear();
                order
            })
            .collect();
        orders.sort_by(|a, b| a.date_created.cmp(&b.date_created));

        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::tests::sample_order;

    #[tokio::test]
    async fn test_first_write_wins() {
        let repo = InMemoryOrderRepository::new();
        let first = sample_order("A1");
        let mut second = sample_order("A1");
        second.track_number = "OTHER".to_string();

        repo.save(&first).await.unwrap();
        repo.save(&second).await.unwrap();

        assert_eq!(repo.stored_count(), 1);
        assert_eq!(repo.get("A1").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_resubmit_with_other_items_keeps_first_items() {
        let repo = InMemoryOrderRepository::new();
        let first = sample_order("A1");
        let mut second = sample_order("A1");
        second.items[0].chrt_id += 1;

        repo.save(&first).await.unwrap();
        repo.save(&second).await.unwrap();

        assert_eq!(repo.get_items("A1").await.unwrap(), first.items);
    }

    #[tokio::test]
    async fn test_get_all_omits_items() {
        let repo = InMemoryOrderRepository::new();
        repo.save(&sample_order("A1")).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].items.is_empty());
        assert_eq!(repo.get_items("A1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queued_failures_are_consumed_in_order() {
        let repo = InMemoryOrderRepository::new();
        repo.fail_next_saves([transient_error()]);

        assert!(repo.save(&sample_order("A1")).await.is_err());
        assert!(repo.save(&sample_order("A1")).await.is_ok());
        assert_eq!(repo.saves(), 2);
    }
}
