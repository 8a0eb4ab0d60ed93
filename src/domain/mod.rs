// ============================================================================
// Domain Layer - Business Types
// ============================================================================
//
// This module contains domain-specific aggregates and their invariants.
// Each aggregate has its own subdirectory with:
// - Value objects
// - Errors
// - Validation
//
// ============================================================================

pub mod order;
