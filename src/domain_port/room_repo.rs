use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

/// Creation outcome distinct from `ChatError`: the duplicate case is part of
/// the room directory's normal control flow, not a caller-visible failure.
#[derive(Debug, thiserror::Error)]
pub enum RoomCreateError {
    /// The (listing scope, unordered pair) uniqueness key already exists —
    /// a concurrent creator won the race.
    #[error("room already exists for this pair")]
    Duplicate,
    #[error("store error: {0}")]
    Store(String),
}

#[async_trait::async_trait]
pub trait RoomRepo: Send + Sync {
    async fn find_for_pair_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<Option<RoomRecord>, ChatError>;

    /// Creates the room and both participant rows atomically. Uniqueness of
    /// (listing scope, pair) is enforced by the storage layer; losers of a
    /// creation race get [`RoomCreateError::Duplicate`].
    async fn create_with_participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: Option<ListingId>,
        pair: &MemberPair,
    ) -> Result<RoomRecord, RoomCreateError>;

    async fn get_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Option<RoomRecord>, ChatError>;

    async fn participants_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<Vec<MemberId>, ChatError>;

    /// Hard delete: messages, then participants, then the room.
    async fn delete_cascade_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
    ) -> Result<(), ChatError>;

    /// The "my rooms" aggregation as one query: counterpart, listing title,
    /// latest message, unread count. Ordering: rooms with messages first by
    /// last-message time descending, then message-less rooms by creation
    /// time descending.
    async fn list_summaries_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Vec<RoomListRow>, ChatError>;
}
