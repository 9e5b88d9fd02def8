use super::util::{downcast, is_dup_key};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row};

pub struct MySqlRoomRepo {
    #[allow(dead_code)]
    pool: MySqlPool,
}

impl MySqlRoomRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRoomRepo { pool }
    }
}

fn row_to_room(row: &sqlx::mysql::MySqlRow) -> RoomRecord {
    RoomRecord {
        room_id: row.get::<RoomId, _>("room_id"),
        listing_id: row.get::<Option<ListingId>, _>("listing_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}

#[async_trait::async_trait]
impl RoomRepo for MySqlRoomRepo {
    async fn find_for_pair_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<Option<RoomRecord>, ChatError> {
        let tx = downcast(tx);

        // listing_key folds the NULL listing scope into one comparable value,
        // mirroring the unique index.
        let row = sqlx::query(
            r#"
SELECT room_id, listing_id, created_at
FROM chat_room
WHERE listing_key = COALESCE(?, 0)
  AND member_lo = ?
  AND member_hi = ?
"#,
        )
        .bind(listing_id)
        .bind(pair.lo())
        .bind(pair.hi())
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("find room for pair: {e}")))?;

        Ok(row.as_ref().map(row_to_room))
    }

    async fn create_with_participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<RoomRecord, RoomCreateError> {
        let tx = downcast(tx);

        let res = sqlx::query(
            r#"
INSERT INTO chat_room (listing_id, member_lo, member_hi)
VALUES (?, ?, ?)
"#,
        )
        .bind(listing_id)
        .bind(pair.lo())
        .bind(pair.hi())
        .execute(tx.conn())
        .await;

        let res = match res {
            Ok(res) => res,
            Err(e) if is_dup_key(&e) => return Err(RoomCreateError::Duplicate),
            Err(e) => return Err(RoomCreateError::Store(format!("insert chat_room: {e}"))),
        };
        let room_id = RoomId(res.last_insert_id() as i64);

        for member in [pair.lo(), pair.hi()] {
            sqlx::query(
                r#"
INSERT INTO chat_participant (room_id, member_id, last_read_message_id)
VALUES (?, ?, NULL)
"#,
            )
            .bind(room_id)
            .bind(member)
            .execute(tx.conn())
            .await
            .map_err(|e| RoomCreateError::Store(format!("insert chat_participant: {e}")))?;
        }

        let row = sqlx::query(
            r#"
SELECT room_id, listing_id, created_at
FROM chat_room
WHERE room_id = ?
"#,
        )
        .bind(room_id)
        .fetch_one(tx.conn())
        .await
        .map_err(|e| RoomCreateError::Store(format!("fetch created room: {e}")))?;

        Ok(row_to_room(&row))
    }

    async fn get_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, ChatError> {
        let tx = downcast(tx);

        let row = sqlx::query(
            r#"
SELECT room_id, listing_id, created_at
FROM chat_room
WHERE room_id = ?
"#,
        )
        .bind(room_id)
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("get room: {e}")))?;

        Ok(row.as_ref().map(row_to_room))
    }

    async fn participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Vec<MemberId>, ChatError> {
        let tx = downcast(tx);

        let rows = sqlx::query(
            r#"
SELECT member_id
FROM chat_participant
WHERE room_id = ?
ORDER BY member_id
"#,
        )
        .bind(room_id)
        .fetch_all(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("query room participants: {e}")))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<MemberId, _>("member_id"))
            .collect())
    }

    async fn delete_cascade_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<(), ChatError> {
        let tx = downcast(tx);

        // Child rows first.
        sqlx::query("DELETE FROM chat_message WHERE room_id = ?")
            .bind(room_id)
            .execute(tx.conn())
            .await
            .map_err(|e| ChatError::Store(format!("delete room messages: {e}")))?;

        sqlx::query("DELETE FROM chat_participant WHERE room_id = ?")
            .bind(room_id)
            .execute(tx.conn())
            .await
            .map_err(|e| ChatError::Store(format!("delete room participants: {e}")))?;

        sqlx::query("DELETE FROM chat_room WHERE room_id = ?")
            .bind(room_id)
            .execute(tx.conn())
            .await
            .map_err(|e| ChatError::Store(format!("delete room: {e}")))?;

        Ok(())
    }

    async fn list_summaries_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Vec<RoomListRow>, ChatError> {
        let tx = downcast(tx);

        // One aggregating query instead of per-room round trips. Collaborator
        // tables are LEFT JOINed so withdrawn members and deleted listings
        // degrade to NULL display fields rather than hiding the room.
        let rows = sqlx::query(
            r#"
SELECT
    r.room_id                   AS room_id,
    r.listing_id                AS listing_id,
    l.title                     AS listing_title,
    op.member_id                AS other_member_id,
    om.nickname                 AS other_nickname,
    om.email                    AS other_email,
    lm.message_id               AS last_message_id,
    lm.content                  AS last_content,
    lm.inserted_at              AS last_inserted_at,
    lm.sender_id                AS last_sender_id,
    sm.nickname                 AS last_sender_nickname,
    sm.avatar_file              AS last_sender_avatar_file,
    (
      SELECT COUNT(*)
      FROM chat_message cm
      WHERE cm.room_id = r.room_id
        AND cm.sender_id <> p.member_id
        AND cm.message_id > COALESCE(p.last_read_message_id, 0)
    )                           AS unread_count,
    r.created_at                AS created_at
FROM chat_room r
JOIN chat_participant p   ON p.room_id = r.room_id AND p.member_id = ?
JOIN chat_participant op  ON op.room_id = r.room_id AND op.member_id <> ?
LEFT JOIN member om       ON om.member_id = op.member_id
LEFT JOIN listing l       ON l.listing_id = r.listing_id
LEFT JOIN chat_message lm ON lm.message_id =
      (SELECT MAX(message_id) FROM chat_message WHERE room_id = r.room_id)
LEFT JOIN member sm       ON sm.member_id = lm.sender_id
ORDER BY (lm.message_id IS NULL) ASC,
         COALESCE(lm.inserted_at, r.created_at) DESC
"#,
        )
        .bind(member_id)
        .bind(member_id)
        .fetch_all(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("aggregate my rooms: {e}")))?;

        let out = rows
            .iter()
            .map(|row| RoomListRow {
                room_id: row.get::<RoomId, _>("room_id"),
                listing_id: row.get::<Option<ListingId>, _>("listing_id"),
                listing_title: row.get::<Option<String>, _>("listing_title"),
                other_member_id: row.get::<MemberId, _>("other_member_id"),
                other_nickname: row.get::<Option<String>, _>("other_nickname"),
                other_email: row.get::<Option<String>, _>("other_email"),
                last_message_id: row.get::<Option<MessageId>, _>("last_message_id"),
                last_content: row.get::<Option<String>, _>("last_content"),
                last_inserted_at: row.get::<Option<DateTime<Utc>>, _>("last_inserted_at"),
                last_sender_id: row.get::<Option<MemberId>, _>("last_sender_id"),
                last_sender_nickname: row.get::<Option<String>, _>("last_sender_nickname"),
                last_sender_avatar_file: row.get::<Option<String>, _>("last_sender_avatar_file"),
                unread_count: row.get::<i64, _>("unread_count"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect();

        Ok(out)
    }
}
