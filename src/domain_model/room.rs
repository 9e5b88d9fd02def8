use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct RoomId(pub i64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RoomId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(RoomId)
    }
}

/// A 1:1 conversation context. Immutable after creation; `listing_id` is
/// `None` for rooms not anchored to a listing.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub listing_id: Option<ListingId>,
    pub created_at: DateTime<Utc>,
}

/// Result of the idempotent open: both racers of a concurrent open receive
/// the same `room_id`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedRoom {
    pub room_id: RoomId,
    pub listing_id: Option<ListingId>,
    pub buyer_id: MemberId,
    pub seller_id: MemberId,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSnippet {
    pub message_id: MessageId,
    pub content: String,
    pub inserted_at: DateTime<Utc>,
    pub sender_id: MemberId,
    pub sender_nickname: String,
    pub sender_avatar_url: String,
}

/// One row of the "my rooms" view.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub listing_id: Option<ListingId>,
    pub listing_title: Option<String>,
    pub other_member_id: MemberId,
    pub other_nickname: String,
    pub other_email: Option<String>,
    pub last_message: Option<MessageSnippet>,
    pub unread_count: i64,
}

/// Raw projection produced by the room-list aggregation query, before
/// display enrichment. Kept as a fixed value shape so the aggregation stays
/// a single query plan regardless of the storage backend.
#[derive(Debug, Clone)]
pub struct RoomListRow {
    pub room_id: RoomId,
    pub listing_id: Option<ListingId>,
    pub listing_title: Option<String>,
    pub other_member_id: MemberId,
    pub other_nickname: Option<String>,
    pub other_email: Option<String>,
    pub last_message_id: Option<MessageId>,
    pub last_content: Option<String>,
    pub last_inserted_at: Option<DateTime<Utc>>,
    pub last_sender_id: Option<MemberId>,
    pub last_sender_nickname: Option<String>,
    pub last_sender_avatar_file: Option<String>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyDisplay {
    pub member_id: MemberId,
    pub nickname: String,
    pub avatar_url: String,
}

/// Room header for the conversation page: listing meta plus both parties.
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetail {
    pub room_id: RoomId,
    pub listing_id: ListingId,
    pub listing_title: String,
    pub listing_price: Option<i64>,
    pub listing_thumb_url: String,
    pub seller: PartyDisplay,
    pub buyer: Option<PartyDisplay>,
}
