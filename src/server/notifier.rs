use crate::domain_port::*;
use crate::server::EventPublisher;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drains the transactional outbox into the event transport. Delivery is
/// at-least-once: a publish that fails is rescheduled with backoff, a crash
/// between publish and mark-delivered re-publishes on restart.
pub struct Notifier {
    tx_manager: Arc<dyn TxManager>,
    outbox_repo: Arc<dyn OutboxRepo>,
    event_publisher: Arc<dyn EventPublisher>,
    topic: String,
    cancellation_token: CancellationToken,
}

impl Notifier {
    pub fn new(
        tx_manager: Arc<dyn TxManager>,
        outbox_repo: Arc<dyn OutboxRepo>,
        event_publisher: Arc<dyn EventPublisher>,
        topic: &str,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            tx_manager,
            outbox_repo,
            event_publisher,
            topic: topic.to_owned(),
            cancellation_token,
        }
    }

    async fn tick_once(&self) -> anyhow::Result<()> {
        let mut tx = self.tx_manager.begin().await?;

        let now = Utc::now();
        let batch = self
            .outbox_repo
            .claim_ready_batch_in_tx(&mut *tx, now, 256)
            .await?;

        if batch.is_empty() {
            tx.commit().await?;
            tokio::time::sleep(Duration::from_millis(200)).await;
            return Ok(());
        }

        for event in &batch {
            // Room-keyed partitioning keeps one room's publishes in append
            // order on the transport.
            let key = match &event.partition_key {
                Some(key) => key.clone(),
                None => event.event_id.0.to_string(),
            };
            let payload = serde_json::to_vec(&event.payload_json)?;

            match self
                .event_publisher
                .publish(&self.topic, key.as_bytes(), &payload)
                .await
            {
                Ok(()) => {
                    self.outbox_repo
                        .mark_delivered_in_tx(&mut *tx, event.event_id, Utc::now())
                        .await?;
                }
                Err(e) => {
                    // backoff
                    let next = Utc::now() + chrono::Duration::seconds(2);
                    self.outbox_repo
                        .reschedule_in_tx(&mut *tx, event.event_id, next, &format!("{e:#}"))
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Notifier shutting down...");
                    break;
                }
                result = self.tick_once() => {
                    if let Err(e) = result {
                        tracing::error!("Notifier error: {:#?}", e);
                    }
                }
            }
        }
        Ok(())
    }
}
