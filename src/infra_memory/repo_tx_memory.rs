use crate::domain_port::{StorageTx, TxManager};

pub struct MemoryTxManager;

#[async_trait::async_trait]
impl TxManager for MemoryTxManager {
    async fn begin<'t>(&'t self) -> anyhow::Result<Box<dyn StorageTx<'t> + 't>> {
        Ok(Box::new(MemoryTx))
    }
}

/// Repo calls against the memory backend apply immediately, so commit and
/// rollback are both no-ops.
pub struct MemoryTx;

#[async_trait::async_trait]
impl<'t> StorageTx<'t> for MemoryTx {
    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}
