use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait MessageRepo: Send + Sync {
    /// Assigns the next id and the server timestamp, persists, and returns
    /// the stored record.
    async fn insert_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        sender_id: MemberId,
        content: &str,
    ) -> Result<MessageRecord, ChatError>;

    /// Window of up to `limit` messages with id < `before` (or the newest
    /// when absent), returned ascending.
    async fn list_before_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        before: Option<MessageId>,
        limit: PageSize,
    ) -> Result<Vec<MessageRecord>, ChatError>;

    /// Every message with id > `after`, ascending, unbounded — reconnect
    /// catch-up is expected to be short.
    async fn list_after_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        room_id: RoomId,
        after: MessageId,
    ) -> Result<Vec<MessageRecord>, ChatError>;
}
