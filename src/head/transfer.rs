use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::balance::BalanceReader;
use crate::adapters::LedgerTool;
use crate::domain::{Balance, PeerId, TxDraft};
use crate::error::{EscrowError, Result};

/// Single-input L1 payment from one peer's funding address
#[derive(Clone)]
pub struct L1Transfer {
    tool: Arc<dyn LedgerTool>,
    balances: BalanceReader,
    fee: u64,
    settle_delay: Duration,
}

impl L1Transfer {
    pub fn new(
        tool: Arc<dyn LedgerTool>,
        balances: BalanceReader,
        fee: u64,
        settle_delay: Duration,
    ) -> Self {
        Self {
            tool,
            balances,
            fee,
            settle_delay,
        }
    }

    /// Send `amount` lovelace from `from` to `to` out of its largest output.
    ///
    /// Returns the sender's L1 balance read after the settle delay.
    pub async fn send(&self, from: PeerId, to: &str, amount: u64) -> Result<Balance> {
        info!(%from, to, amount, "Starting L1 transfer");

        let utxo = self.tool.query_utxo(from).await?;
        let (tx_ref, entry) = utxo.largest().ok_or(EscrowError::NoFunds { peer: from })?;
        let available = entry.lovelace();
        let required = amount.saturating_add(self.fee);
        if available < required {
            return Err(EscrowError::InsufficientFunds {
                requested: required,
                available,
            });
        }

        let change_address = self.tool.address(from).await?;
        let draft = TxDraft::transfer(
            vec![tx_ref.clone()],
            available,
            to,
            amount,
            &change_address,
            self.fee,
        )
        .ok_or(EscrowError::InsufficientFunds {
            requested: required,
            available,
        })?;

        let body = self.tool.build_transaction(&draft).await?;
        let signed = self.tool.sign_transaction(from, &body).await?;
        self.tool.submit_transaction(&signed).await?;
        info!(%from, amount, "L1 transfer submitted");

        tokio::time::sleep(self.settle_delay).await;
        Ok(self.balances.l1_balance(from).await)
    }
}
