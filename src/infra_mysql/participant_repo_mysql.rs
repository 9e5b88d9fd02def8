use super::util::downcast;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::MySqlPool;

pub struct MySqlParticipantRepo {
    #[allow(dead_code)]
    pool: MySqlPool,
}

impl MySqlParticipantRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlParticipantRepo { pool }
    }
}

#[async_trait::async_trait]
impl ParticipantRepo for MySqlParticipantRepo {
    async fn exists_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
    ) -> Result<bool, ChatError> {
        let tx = downcast(tx);

        let count: i64 = sqlx::query_scalar(
            r#"
SELECT COUNT(1)
FROM chat_participant
WHERE room_id = ? AND member_id = ?
"#,
        )
        .bind(key.room_id)
        .bind(key.member_id)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("participant exists: {e}")))?;

        Ok(count > 0)
    }

    async fn mark_read_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
        last_read: MessageId,
    ) -> Result<(), ChatError> {
        let tx = downcast(tx);

        // Single-statement ratchet: the row is created on first ack and the
        // position only ever moves forward, whatever order acks land in.
        sqlx::query(
            r#"
INSERT INTO chat_participant (room_id, member_id, last_read_message_id)
VALUES (?, ?, ?)
ON DUPLICATE KEY UPDATE last_read_message_id =
    GREATEST(COALESCE(last_read_message_id, 0), VALUES(last_read_message_id))
"#,
        )
        .bind(key.room_id)
        .bind(key.member_id)
        .bind(last_read)
        .execute(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("mark read: {e}")))?;

        Ok(())
    }
}
