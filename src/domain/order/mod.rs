// ============================================================================
// Order Domain - The Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific domain code:
// - Value objects (Order, Delivery, Payment, Item)
// - Errors (ValidationError enum)
// - Validation (pure field-level checks)
//
// Persistence and caching of the aggregate live outside the domain layer.
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod validation;

// Re-export for convenience
pub use value_objects::*;
pub use validation::validate;
