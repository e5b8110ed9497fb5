use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::{HydraNodeClient, LedgerTool};
use crate::domain::{Balance, PeerId};
use crate::error::Result;

/// Reads L1 and L2 balances of a peer's funding address
#[derive(Clone)]
pub struct BalanceReader {
    tool: Arc<dyn LedgerTool>,
    node: HydraNodeClient,
}

impl BalanceReader {
    pub fn new(tool: Arc<dyn LedgerTool>, node: HydraNodeClient) -> Self {
        Self { tool, node }
    }

    pub async fn try_l1_balance(&self, peer: PeerId) -> Result<Balance> {
        let utxo = self.tool.query_utxo(peer).await?;
        Ok(Balance::from_lovelace(utxo.total_lovelace()))
    }

    /// Sum of `peer`'s outputs in the confirmed snapshot of its own node
    pub async fn try_l2_balance(&self, peer: PeerId) -> Result<Balance> {
        let address = self.tool.address(peer).await?;
        let snapshot = self.node.snapshot_utxo(peer).await?;
        let owned = snapshot.owned_by(&address);
        debug!(%peer, outputs = owned.len(), lovelace = owned.total_lovelace(), "L2 balance");
        Ok(Balance::from_lovelace(owned.total_lovelace()))
    }

    /// L1 balance, zero when the tool is unavailable
    pub async fn l1_balance(&self, peer: PeerId) -> Balance {
        self.try_l1_balance(peer).await.unwrap_or_else(|e| {
            warn!(%peer, error = %e, "Failed to read L1 balance, reporting zero");
            Balance::zero()
        })
    }

    /// L2 balance, zero when the node or tool is unavailable
    pub async fn l2_balance(&self, peer: PeerId) -> Balance {
        self.try_l2_balance(peer).await.unwrap_or_else(|e| {
            warn!(%peer, error = %e, "Failed to read L2 balance, reporting zero");
            Balance::zero()
        })
    }

    /// Funding address, empty when it cannot be read
    pub async fn address_or_empty(&self, peer: PeerId) -> String {
        self.tool.address(peer).await.unwrap_or_else(|e| {
            warn!(%peer, error = %e, "Failed to read L1 address");
            String::new()
        })
    }
}
