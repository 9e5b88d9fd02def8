use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

/// External collaborator: member/profile service. Absent members are a
/// normal outcome (withdrawn accounts) — callers substitute a placeholder
/// rather than failing.
#[async_trait::async_trait]
pub trait MemberRepo: Send + Sync {
    async fn get_profile_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Option<MemberProfile>, ChatError>;
}
