use actix::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::{DeadLetter, DeadLetterSink};
use crate::messaging::RedpandaClient;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Publishes rejected messages to the dead-letter topic. Publishing is
// fire-and-forget from the ingest side: the consumer hands a letter over with
// `do_send` and moves on. Publishes are processed one at a time, so a
// `FlushAndStop` sent after them is handled only once they have completed.
//
// A failed publish is logged and the letter dropped; it never reaches back
// into the ingest pipeline.
//
// ============================================================================

pub struct DlqActor {
    client: Arc<RedpandaClient>,
    topic: String,
}

impl DlqActor {
    pub fn new(client: Arc<RedpandaClient>, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(topic = %self.topic, "DlqActor started - Dead Letter Queue ready");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct PublishDeadLetter(pub DeadLetter);

/// Flush the producer (bounded by `timeout`) and stop the actor.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct FlushAndStop {
    pub timeout: Duration,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<PublishDeadLetter> for DlqActor {
    type Result = ();

    fn handle(&mut self, msg: PublishDeadLetter, ctx: &mut Self::Context) {
        let letter = msg.0;
        let client = self.client.clone();
        let topic = self.topic.clone();

        tracing::error!(
            dlq_id = %letter.id,
            reason = letter.reason.as_str(),
            source = %letter.source,
            detail = %letter.detail,
            "💀 Publishing message to Dead Letter Queue"
        );

        // `wait` holds back further messages until this publish settles.
        ctx.wait(
            async move {
                match client.publish(&topic, &letter.payload, &letter.headers()).await {
                    Ok(()) => tracing::info!(dlq_id = %letter.id, "Dead letter published"),
                    Err(e) => tracing::error!(
                        dlq_id = %letter.id,
                        source = %letter.source,
                        error = %e,
                        "Failed to publish dead letter, dropping it"
                    ),
                }
            }
            .into_actor(self),
        );
    }
}

impl Handler<FlushAndStop> for DlqActor {
    type Result = ();

    fn handle(&mut self, msg: FlushAndStop, ctx: &mut Self::Context) {
        tracing::info!(timeout_ms = msg.timeout.as_millis() as u64, "Flushing dead-letter producer");

        if let Err(e) = self.client.flush(msg.timeout) {
            tracing::warn!(error = %e, "Dead-letter producer flush incomplete");
        }

        ctx.stop();
    }
}

impl DeadLetterSink for Addr<DlqActor> {
    fn send(&self, letter: DeadLetter) {
        self.do_send(PublishDeadLetter(letter));
    }
}
