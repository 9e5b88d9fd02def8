use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::server::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CollectingPublisher {
    published: Mutex<Vec<(String, Vec<u8>, Vec<u8>)>>,
}

#[async_trait::async_trait]
impl EventPublisher for CollectingPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> anyhow::Result<()> {
        self.published
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push((topic.to_owned(), key.to_vec(), payload.to_vec()));
        Ok(())
    }
}

fn message_event(room_id: RoomId, receivers: Vec<MemberId>, text: &str) -> OutboxEvent {
    OutboxEvent::new(
        EventType::ChatMessageNew,
        Some(room_id.to_string()),
        receivers.clone(),
        &S2CEnvelope {
            room_id,
            receivers,
            body: S2CEvent::ChatMessageNew(ChatMessageNew {
                room_id,
                message_id: MessageId(1),
                sender_id: MemberId(1),
                sender_nickname: "alice".to_string(),
                sender_avatar_url: "/user.png".to_string(),
                content: text.to_string(),
                inserted_at: chrono::Utc::now(),
            }),
        },
    )
    .expect("compose event")
}

#[tokio::test]
async fn drains_outbox_and_marks_delivered() {
    let store = Arc::new(MemoryStore::new());
    let tx_manager: Arc<dyn TxManager> = Arc::new(MemoryTxManager);
    let outbox: Arc<dyn OutboxRepo> = Arc::new(MemoryOutboxRepo::new(store.clone()));
    let publisher = Arc::new(CollectingPublisher::default());

    {
        let mut tx = tx_manager.begin().await.expect("begin");
        outbox
            .enqueue_in_tx(
                &mut *tx,
                &message_event(RoomId(1), vec![MemberId(1), MemberId(2)], "first"),
            )
            .await
            .expect("enqueue");
        outbox
            .enqueue_in_tx(
                &mut *tx,
                &message_event(RoomId(1), vec![MemberId(1), MemberId(2)], "second"),
            )
            .await
            .expect("enqueue");
        tx.commit().await.expect("commit");
    }

    let cancel = CancellationToken::new();
    let notifier = Notifier::new(
        tx_manager.clone(),
        outbox.clone(),
        publisher.clone(),
        "chat.room.events.test",
        cancel.clone(),
    );
    let handle = tokio::spawn(async move { notifier.run().await });

    // Wait for both publishes to land.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        {
            let published = publisher.published.lock().expect("lock");
            if published.len() >= 2 {
                break;
            }
        }
        assert!(tokio::time::Instant::now() < deadline, "notifier too slow");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    handle.await.expect("join").expect("run");

    let published = publisher.published.lock().expect("lock");
    assert_eq!(published.len(), 2);

    // Both publishes for the room share the partition key, preserving
    // append order on the transport.
    assert_eq!(published[0].1, RoomId(1).to_string().into_bytes());
    assert_eq!(published[0].1, published[1].1);

    let first: S2CEnvelope = serde_json::from_slice(&published[0].2).expect("decode");
    match first.body {
        S2CEvent::ChatMessageNew(new) => assert_eq!(new.content, "first"),
        other => panic!("expected ChatMessageNew, got {other:?}"),
    }

    // Everything is marked delivered; a fresh claim finds nothing.
    let mut tx = tx_manager.begin().await.expect("begin");
    let remaining = outbox
        .claim_ready_batch_in_tx(&mut *tx, chrono::Utc::now(), 64)
        .await
        .expect("claim");
    assert!(remaining.is_empty());
}
