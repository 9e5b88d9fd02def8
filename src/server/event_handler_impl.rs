use crate::domain_model::*;
use crate::server::{EventHandler, HandleOutcome, OutboundQueue};
use std::sync::Arc;

/// Terminal hop of the broadcast path: decodes the room envelope and fans
/// the event out to every addressed member with a live, subscribed
/// connection. Offline receivers are dropped — catch-up is the client's job
/// via the `after_id` history cursor.
pub struct RoomFanoutHandler {
    outbound_queue: Arc<dyn OutboundQueue>,
}

impl RoomFanoutHandler {
    pub fn new(outbound_queue: Arc<dyn OutboundQueue>) -> Self {
        Self { outbound_queue }
    }
}

#[async_trait::async_trait]
impl EventHandler for RoomFanoutHandler {
    async fn handle(&self, payload: &[u8]) -> anyhow::Result<HandleOutcome> {
        let envelope = serde_json::from_slice::<S2CEnvelope>(payload)?;

        for receiver in envelope.receivers {
            if let Err(e) = self
                .outbound_queue
                .enqueue(receiver, envelope.room_id, &envelope.body)
                .await
            {
                tracing::warn!("outbound queue dropped (offline?): {e}");
            }
        }

        Ok(HandleOutcome::Commit)
    }
}
