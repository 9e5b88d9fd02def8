use crate::domain_model::*;

/// Compound key of a member's membership record in a room.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct ParticipantKey {
    pub room_id: RoomId,
    pub member_id: MemberId,
}

impl ParticipantKey {
    pub fn new(room_id: RoomId, member_id: MemberId) -> Self {
        Self { room_id, member_id }
    }
}
