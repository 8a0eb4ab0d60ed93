// ============================================================================
// Persistence Layer
// ============================================================================
//
// `OrderRepository` is the seam between the service and PostgreSQL.
// `PgOrderRepository` is the only production implementation; tests run
// against the in-memory double.
//
// ============================================================================

pub mod postgres;
pub mod repository;
pub mod schema;

#[cfg(test)]
pub mod memory;

pub use postgres::PgOrderRepository;
pub use repository::{OrderRepository, StoreError};
pub use schema::{check_schema, verify_connection};
