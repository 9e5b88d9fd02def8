use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

/// External collaborator: listing/board service, reduced to the one lookup
/// the chat core needs.
#[async_trait::async_trait]
pub trait ListingRepo: Send + Sync {
    async fn get_card_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: ListingId,
    ) -> Result<Option<ListingCard>, ChatError>;
}
