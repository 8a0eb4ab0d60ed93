use async_trait::async_trait;

use crate::domain::order::{Item, Order};
use crate::utils::IsTransient;

// ============================================================================
// Order Repository - Persistence Seam
// ============================================================================
//
// The store is the single source of truth for order aggregates. Writes are
// idempotent per `order_uid`: saving an aggregate that already exists is a
// successful no-op, so at-least-once redelivery is absorbed here.
//
// ============================================================================

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Atomically persist the order with its delivery, payment and items.
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    /// Reconstruct the full aggregate, items included.
    async fn get(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Items of one order, in their original sequence.
    async fn get_items(&self, order_uid: &str) -> Result<Vec<Item>, StoreError>;

    /// Every stored order without items. Only used to warm the cache at startup.
    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// SQLSTATE classes worth retrying: connection exceptions, transaction
/// rollbacks (serialization failures, deadlocks), insufficient resources and
/// operator intervention (admin shutdown, crash recovery).
const TRANSIENT_SQLSTATE_CLASSES: [&str; 4] = ["08", "40", "53", "57"];

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::NotFound(_) => false,
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed
                | sqlx::Error::Io(_)
                | sqlx::Error::Tls(_)
                | sqlx::Error::Protocol(_) => true,
                sqlx::Error::Database(db_err) => db_err
                    .code()
                    .map(|code| TRANSIENT_SQLSTATE_CLASSES.iter().any(|class| code.starts_with(class)))
                    .unwrap_or(false),
                _ => false,
            },
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
