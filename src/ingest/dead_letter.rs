use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::pipeline::StreamPosition;

// ============================================================================
// Dead Letters
// ============================================================================
//
// A dead letter carries the original payload byte-for-byte. Why it was
// rejected and where it came from travel as record headers, so the DLQ topic
// stays replayable with the same decoder.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// Payload could not be decoded as an order
    Malformed,
    /// Payload decoded but failed validation
    Invalid,
    /// Store kept failing past the redelivery limit
    PersistenceExhausted,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::Malformed => "malformed",
            DeadLetterReason::Invalid => "invalid",
            DeadLetterReason::PersistenceExhausted => "persistence_exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub reason: DeadLetterReason,
    pub detail: String,
    pub payload: Vec<u8>,
    pub source: StreamPosition,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        reason: DeadLetterReason,
        detail: impl Into<String>,
        payload: &[u8],
        source: StreamPosition,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            reason,
            detail: detail.into(),
            payload: payload.to_vec(),
            source,
            failed_at: Utc::now(),
        }
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("dlq-id", self.id.to_string()),
            ("dlq-reason", self.reason.as_str().to_string()),
            ("dlq-detail", self.detail.clone()),
            ("dlq-source", self.source.to_string()),
            ("dlq-failed-at", self.failed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        ]
    }
}

/// Best-effort side channel for rejected messages. `send` must not block the
/// caller and never reports failure; losing a dead letter is acceptable.
pub trait DeadLetterSink: Send + Sync {
    fn send(&self, letter: DeadLetter);
}
