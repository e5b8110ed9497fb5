use std::sync::Arc;
use tracing::info;

use crate::adapters::{HydraNodeClient, LedgerTool};
use crate::domain::{PeerId, TxArtifact};
use crate::error::{EscrowError, Result};

/// Moves a peer's L1 funds into the head: query → commit → sign → submit
#[derive(Clone)]
pub struct CommitPipeline {
    tool: Arc<dyn LedgerTool>,
    node: HydraNodeClient,
}

impl CommitPipeline {
    pub fn new(tool: Arc<dyn LedgerTool>, node: HydraNodeClient) -> Self {
        Self { tool, node }
    }

    /// Commit every L1 output of `peer`. The first failing step aborts the commit.
    pub async fn commit(&self, peer: PeerId) -> Result<()> {
        info!(%peer, "Starting commit");

        let utxo = self.tool.query_utxo(peer).await?;
        if utxo.is_empty() {
            return Err(EscrowError::NoFunds { peer });
        }
        info!(%peer, outputs = utxo.len(), lovelace = utxo.total_lovelace(), "Committing L1 outputs");

        let draft = self.node.commit(peer, &utxo).await?;
        let signed = self
            .tool
            .sign_transaction(peer, &TxArtifact::tx(draft))
            .await?;
        self.tool.submit_transaction(&signed).await?;

        info!(%peer, "Commit transaction submitted");
        Ok(())
    }
}
