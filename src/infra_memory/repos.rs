use super::store::{MemoryStore, OutboxRow};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;

fn chat_store_err(e: anyhow::Error) -> ChatError {
    ChatError::Store(e.to_string())
}

// region room repo

pub struct MemoryRoomRepo {
    store: Arc<MemoryStore>,
}

impl MemoryRoomRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl RoomRepo for MemoryRoomRepo {
    async fn find_for_pair_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<Option<RoomRecord>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        let key = MemoryStore::room_key(listing_id, pair);
        Ok(state
            .room_keys
            .get(&key)
            .and_then(|room_id| state.rooms.get(room_id))
            .cloned())
    }

    async fn create_with_participants_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<RoomRecord, RoomCreateError> {
        let mut state = self
            .store
            .lock()
            .map_err(|e| RoomCreateError::Store(e.to_string()))?;

        let key = MemoryStore::room_key(listing_id, pair);
        if state.room_keys.contains_key(&key) {
            return Err(RoomCreateError::Duplicate);
        }

        state.next_room_id += 1;
        let room = RoomRecord {
            room_id: RoomId(state.next_room_id),
            listing_id,
            created_at: Utc::now(),
        };

        state.room_keys.insert(key, room.room_id);
        state.rooms.insert(room.room_id, room.clone());
        for member in [pair.lo(), pair.hi()] {
            state
                .participants
                .insert(ParticipantKey::new(room.room_id, member), None);
        }

        Ok(room)
    }

    async fn get_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        Ok(state.rooms.get(&room_id).cloned())
    }

    async fn participants_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Vec<MemberId>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        let mut members: Vec<MemberId> = state
            .participants
            .keys()
            .filter(|key| key.room_id == room_id)
            .map(|key| key.member_id)
            .collect();
        members.sort();
        Ok(members)
    }

    async fn delete_cascade_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<(), ChatError> {
        let mut state = self.store.lock().map_err(chat_store_err)?;

        state.messages.retain(|_, m| m.room_id != room_id);
        state.participants.retain(|key, _| key.room_id != room_id);
        if let Some(room) = state.rooms.remove(&room_id) {
            let pair_key = state
                .room_keys
                .iter()
                .find(|(_, id)| **id == room.room_id)
                .map(|(key, _)| *key);
            if let Some(key) = pair_key {
                state.room_keys.remove(&key);
            }
        }

        Ok(())
    }

    async fn list_summaries_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Vec<RoomListRow>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;

        let mut rows: Vec<RoomListRow> = Vec::new();
        for (key, last_read) in state.participants.iter() {
            if key.member_id != member_id {
                continue;
            }
            let Some(room) = state.rooms.get(&key.room_id) else {
                continue;
            };

            let Some(other_member_id) = state
                .participants
                .keys()
                .find(|k| k.room_id == room.room_id && k.member_id != member_id)
                .map(|k| k.member_id)
            else {
                continue;
            };
            let other = state.members.get(&other_member_id);

            let last = state
                .messages
                .values()
                .filter(|m| m.room_id == room.room_id)
                .max_by_key(|m| m.message_id);
            let last_sender = last.and_then(|m| state.members.get(&m.sender_id));

            let floor = last_read.map(|id| id.0).unwrap_or(0);
            let unread_count = state
                .messages
                .values()
                .filter(|m| {
                    m.room_id == room.room_id
                        && m.sender_id != member_id
                        && m.message_id.0 > floor
                })
                .count() as i64;

            rows.push(RoomListRow {
                room_id: room.room_id,
                listing_id: room.listing_id,
                listing_title: room
                    .listing_id
                    .and_then(|id| state.listings.get(&id))
                    .map(|l| l.title.clone()),
                other_member_id,
                other_nickname: other.map(|m| m.nickname.clone()),
                other_email: other.and_then(|m| m.email.clone()),
                last_message_id: last.map(|m| m.message_id),
                last_content: last.map(|m| m.content.clone()),
                last_inserted_at: last.map(|m| m.inserted_at),
                last_sender_id: last.map(|m| m.sender_id),
                last_sender_nickname: last_sender.map(|m| m.nickname.clone()),
                last_sender_avatar_file: last_sender.and_then(|m| m.avatar_file.clone()),
                unread_count,
                created_at: room.created_at,
            });
        }

        // Rooms with messages first, newest activity first; message-less
        // rooms after them by creation time.
        rows.sort_by(|a, b| match (a.last_message_id, b.last_message_id) {
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(am), Some(bm)) => b
                .last_inserted_at
                .cmp(&a.last_inserted_at)
                .then(bm.cmp(&am)),
            (None, None) => b
                .created_at
                .cmp(&a.created_at)
                .then(b.room_id.cmp(&a.room_id)),
        });

        Ok(rows)
    }
}

// endregion

// region message repo

pub struct MemoryMessageRepo {
    store: Arc<MemoryStore>,
}

impl MemoryMessageRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl MessageRepo for MemoryMessageRepo {
    async fn insert_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        sender_id: MemberId,
        content: &str,
    ) -> Result<MessageRecord, ChatError> {
        let mut state = self.store.lock().map_err(chat_store_err)?;

        state.next_message_id += 1;
        // Server-assigned timestamp, clamped so it never runs behind an
        // earlier message's timestamp.
        let now = Utc::now();
        let inserted_at = match state.last_message_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        state.last_message_at = Some(inserted_at);

        let record = MessageRecord {
            message_id: MessageId(state.next_message_id),
            room_id,
            sender_id,
            content: content.to_owned(),
            inserted_at,
        };
        state.messages.insert(record.message_id, record.clone());

        Ok(record)
    }

    async fn list_before_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: PageSize,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;

        let mut window: Vec<MessageRecord> = state
            .messages
            .values()
            .rev()
            .filter(|m| m.room_id == room_id)
            .filter(|m| before.is_none_or(|b| m.message_id < b))
            .take(limit.0 as usize)
            .cloned()
            .collect();
        window.reverse();

        Ok(window)
    }

    async fn list_after_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        after: MessageId,
    ) -> Result<Vec<MessageRecord>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;

        Ok(state
            .messages
            .values()
            .filter(|m| m.room_id == room_id && m.message_id > after)
            .cloned()
            .collect())
    }
}

// endregion

// region participant repo

pub struct MemoryParticipantRepo {
    store: Arc<MemoryStore>,
}

impl MemoryParticipantRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ParticipantRepo for MemoryParticipantRepo {
    async fn exists_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
    ) -> Result<bool, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        Ok(state.participants.contains_key(key))
    }

    async fn mark_read_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
        last_read: MessageId,
    ) -> Result<(), ChatError> {
        let mut state = self.store.lock().map_err(chat_store_err)?;

        let entry = state.participants.entry(*key).or_insert(None);
        if entry.is_none_or(|current| last_read > current) {
            *entry = Some(last_read);
        }

        Ok(())
    }
}

// endregion

// region collaborator lookups

pub struct MemoryListingRepo {
    store: Arc<MemoryStore>,
}

impl MemoryListingRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ListingRepo for MemoryListingRepo {
    async fn get_card_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        listing_id: ListingId,
    ) -> Result<Option<ListingCard>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        Ok(state.listings.get(&listing_id).cloned())
    }
}

pub struct MemoryMemberRepo {
    store: Arc<MemoryStore>,
}

impl MemoryMemberRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl MemberRepo for MemoryMemberRepo {
    async fn get_profile_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Option<MemberProfile>, ChatError> {
        let state = self.store.lock().map_err(chat_store_err)?;
        Ok(state.members.get(&member_id).cloned())
    }
}

// endregion

// region outbox repo

pub struct MemoryOutboxRepo {
    store: Arc<MemoryStore>,
}

impl MemoryOutboxRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl OutboxRepo for MemoryOutboxRepo {
    async fn enqueue_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        event: &OutboxEvent,
    ) -> anyhow::Result<()> {
        let mut state = self.store.lock()?;

        if state
            .outbox
            .iter()
            .any(|row| row.event.event_id == event.event_id)
        {
            return Ok(());
        }

        state.outbox.push(OutboxRow {
            event: event.clone(),
            next_attempt_at: event.created_at,
            delivered_at: None,
            last_error: None,
        });

        Ok(())
    }

    async fn claim_ready_batch_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        now: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<OutboxEvent>> {
        let state = self.store.lock()?;

        Ok(state
            .outbox
            .iter()
            .filter(|row| row.delivered_at.is_none() && row.next_attempt_at <= now)
            .take(limit as usize)
            .map(|row| row.event.clone())
            .collect())
    }

    async fn mark_delivered_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        event_id: EventId,
        delivered_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut state = self.store.lock()?;

        if let Some(row) = state
            .outbox
            .iter_mut()
            .find(|row| row.event.event_id == event_id)
        {
            row.delivered_at = Some(delivered_at);
        }

        Ok(())
    }

    async fn reschedule_in_tx<'t>(
        &self,
        _tx: &mut dyn StorageTx<'t>,
        event_id: EventId,
        next_attempt_at: DateTime<Utc>,
        last_error: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.store.lock()?;

        if let Some(row) = state
            .outbox
            .iter_mut()
            .find(|row| row.event.event_id == event_id)
        {
            row.next_attempt_at = next_attempt_at;
            row.last_error = Some(last_error.to_owned());
        }

        Ok(())
    }
}

// endregion
