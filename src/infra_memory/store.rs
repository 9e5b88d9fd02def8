use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub(crate) struct OutboxRow {
    pub event: OutboxEvent,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Default)]
pub(crate) struct MemoryState {
    pub next_room_id: i64,
    pub next_message_id: i64,
    pub last_message_at: Option<DateTime<Utc>>,

    pub rooms: BTreeMap<RoomId, RoomRecord>,
    /// Uniqueness key of the room directory: (listing scope, canonical pair).
    /// The NULL listing scope is folded to 0, like the MySQL generated column.
    pub room_keys: HashMap<(i64, MemberId, MemberId), RoomId>,
    pub participants: HashMap<ParticipantKey, Option<MessageId>>,
    pub messages: BTreeMap<MessageId, MessageRecord>,
    pub outbox: Vec<OutboxRow>,

    pub members: HashMap<MemberId, MemberProfile>,
    pub listings: HashMap<ListingId, ListingCard>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> anyhow::Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))
    }

    pub fn upsert_member(&self, profile: MemberProfile) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.members.insert(profile.member_id, profile);
        Ok(())
    }

    pub fn remove_member(&self, member_id: MemberId) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.members.remove(&member_id);
        Ok(())
    }

    pub fn upsert_listing(&self, card: ListingCard) -> anyhow::Result<()> {
        let mut state = self.lock()?;
        state.listings.insert(card.listing_id, card);
        Ok(())
    }

    pub(crate) fn room_key(listing_id: Option<ListingId>, pair: &MemberPair) -> (i64, MemberId, MemberId) {
        (
            listing_id.map(|l| l.0).unwrap_or(0),
            pair.lo(),
            pair.hi(),
        )
    }
}
