use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("listing not found")]
    ListingNotFound,
    #[error("room not found")]
    RoomNotFound,
    #[error("message content is empty")]
    EmptyMessage,
    #[error("cannot open a room with yourself")]
    SelfChat,
    #[error("member is not a participant of the room")]
    NotParticipant,
    #[error("store error: {0}")]
    Store(String),
}

/// The chat core: room directory, message store, read tracker and the
/// room-list aggregation, behind one seam. Creation conflicts between
/// concurrent `open_or_get_room` calls are resolved internally and never
/// surface to callers.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    /// Opens (or returns) the single room between `requester` and the
    /// listing's owner, scoped to that listing.
    async fn open_or_get_room(
        &self,
        listing_id: ListingId,
        requester: MemberId,
    ) -> Result<OpenedRoom, ChatError>;

    /// Appends a message and ratchets the sender's own read position, then
    /// queues the broadcast.
    async fn send_message(
        &self,
        room_id: RoomId,
        sender: MemberId,
        content: &str,
    ) -> Result<MessageRecord, ChatError>;

    /// Cursor-paged history, always returned oldest-first. `after_id` wins
    /// over `before_id` when both are present and is unbounded (reconnect
    /// catch-up).
    async fn list_messages(
        &self,
        room_id: RoomId,
        before_id: Option<MessageId>,
        after_id: Option<MessageId>,
        limit: PageSize,
    ) -> Result<Vec<MessageRecord>, ChatError>;

    /// Monotonic read-position ratchet; `None` is a no-op.
    async fn mark_read(
        &self,
        room_id: RoomId,
        member_id: MemberId,
        last_message_id: Option<MessageId>,
    ) -> Result<(), ChatError>;

    /// The "my rooms" summary view: last-message snippet, unread count and
    /// counterpart identity per room.
    async fn list_my_rooms(&self, member_id: MemberId) -> Result<Vec<RoomSummary>, ChatError>;

    /// Room header for the conversation page.
    async fn room_detail(&self, room_id: RoomId) -> Result<RoomDetail, ChatError>;

    /// Hard delete, participants only. Cascades messages and participants.
    async fn delete_room(&self, room_id: RoomId, requester: MemberId) -> Result<(), ChatError>;

    async fn verify_participant(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<(), ChatError>;
}
