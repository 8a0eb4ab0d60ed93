// ============================================================================
// Ingest Module
// ============================================================================
//
// - pipeline     - transport-agnostic decode/validate/persist state machine
// - consumer     - rdkafka consumer loop driving the pipeline
// - dead_letter  - dead-letter records and the sink seam
//
// ============================================================================

pub mod consumer;
pub mod dead_letter;
pub mod pipeline;

pub use consumer::{ensure_topics, OrderConsumer};
pub use dead_letter::{DeadLetter, DeadLetterSink};
pub use pipeline::IngestPipeline;
