use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait ParticipantRepo: Send + Sync {
    async fn exists_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
    ) -> Result<bool, ChatError>;

    /// Upserts the participant row (self-healing when absent) and advances
    /// `last_read_message_id` only when the new value is greater — stale or
    /// out-of-order acks never move the position backwards.
    async fn mark_read_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        key: &ParticipantKey,
        last_read: MessageId,
    ) -> Result<(), ChatError>;
}
