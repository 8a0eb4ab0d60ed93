// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for fire-and-forget concerns.
//
// Structure:
// - core/           - Health types shared by actors and their reporters
// - infrastructure/ - Concrete actors (dead-letter publisher, health monitor)
//
// Note: Order ingestion and lookups do NOT run on actors. Actors are
//       reserved for infrastructure concerns only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use self::core::HealthStatus;
pub use infrastructure::{
    DlqActor,
    FlushAndStop,
    GetSystemHealth,
    HealthMonitorActor,
    UpdateHealth,
};
