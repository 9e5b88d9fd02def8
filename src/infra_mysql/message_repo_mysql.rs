use super::util::downcast;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

pub struct MySqlMessageRepo {
    #[allow(dead_code)]
    pool: MySqlPool,
}

impl MySqlMessageRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlMessageRepo { pool }
    }
}

fn row_to_message(row: &sqlx::mysql::MySqlRow) -> MessageRecord {
    MessageRecord {
        message_id: row.get::<MessageId, _>("message_id"),
        room_id: row.get::<RoomId, _>("room_id"),
        sender_id: row.get::<MemberId, _>("sender_id"),
        content: row.get::<String, _>("content"),
        inserted_at: row.get::<DateTime<Utc>, _>("inserted_at"),
    }
}

#[async_trait::async_trait]
impl MessageRepo for MySqlMessageRepo {
    async fn insert_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        sender_id: MemberId,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        let tx = downcast(tx);

        // BIGINT auto-increment: globally increasing, so per-room monotonic.
        let res = sqlx::query(
            r#"
INSERT INTO chat_message (room_id, sender_id, content)
VALUES (?, ?, ?)
"#,
        )
        .bind(room_id)
        .bind(sender_id)
        .bind(content)
        .execute(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("insert chat_message: {e}")))?;

        let message_id = MessageId(res.last_insert_id() as i64);

        let row = sqlx::query(
            r#"
SELECT message_id, room_id, sender_id, content, inserted_at
FROM chat_message
WHERE message_id = ?
"#,
        )
        .bind(message_id)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("fetch inserted message: {e}")))?;

        Ok(row_to_message(&row))
    }

    async fn list_before_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: PageSize,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let tx = downcast(tx);
        let lim = limit.0 as i64;

        let rows = if let Some(before) = before {
            sqlx::query(
                r#"
SELECT message_id, room_id, sender_id, content, inserted_at
FROM chat_message
WHERE room_id = ? AND message_id < ?
ORDER BY message_id DESC
LIMIT ?
"#,
            )
            .bind(room_id)
            .bind(before)
            .bind(lim)
            .fetch_all(tx.conn())
            .await
            .map_err(|e| ChatError::Store(format!("list_before(before): {e}")))?
        } else {
            sqlx::query(
                r#"
SELECT message_id, room_id, sender_id, content, inserted_at
FROM chat_message
WHERE room_id = ?
ORDER BY message_id DESC
LIMIT ?
"#,
            )
            .bind(room_id)
            .bind(lim)
            .fetch_all(tx.conn())
            .await
            .map_err(|e| ChatError::Store(format!("list_before(latest): {e}")))?
        };

        // The window is selected newest-first; callers always get oldest-first.
        let mut out: Vec<MessageRecord> = rows.iter().map(row_to_message).collect();
        out.reverse();

        Ok(out)
    }

    async fn list_after_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        after: MessageId,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let tx = downcast(tx);

        let rows = sqlx::query(
            r#"
SELECT message_id, room_id, sender_id, content, inserted_at
FROM chat_message
WHERE room_id = ? AND message_id > ?
ORDER BY message_id ASC
"#,
        )
        .bind(room_id)
        .bind(after)
        .fetch_all(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("list_after: {e}")))?;

        Ok(rows.iter().map(row_to_message).collect())
    }
}
