use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(MessageId)
    }
}

/// One immutable unit of chat content. `message_id` is assigned from a
/// storage-level counter and is strictly increasing within a room;
/// `inserted_at` is server-assigned and follows the id order.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRecord {
    pub message_id: MessageId,
    pub room_id: RoomId,
    pub sender_id: MemberId,
    pub content: String,
    pub inserted_at: DateTime<Utc>,
}
