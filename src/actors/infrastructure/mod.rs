// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Dead letter publishing
// - Health monitoring
//
// ============================================================================

mod dlq;
mod health_monitor;

pub use dlq::{DlqActor, FlushAndStop};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, UpdateHealth};
