//! Alice → bob payments inside the open head.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::balance::BalanceReader;
use crate::adapters::{HydraNodeClient, LedgerTool, PeerHub, PendingState};
use crate::config::TimeoutConfig;
use crate::domain::{Balance, ClientCommand, MessageTag, PeerId, TxDraft};
use crate::error::{EscrowError, Result};

/// L2 transactions carry no fee
const L2_FEE: u64 = 0;

/// Waiters for the node's reaction to one `NewTx`, armed before it is sent
pub struct ConfirmationWatch {
    tx_valid: PendingState,
    snapshot_confirmed: PendingState,
}

impl ConfirmationWatch {
    pub fn arm(hub: &PeerHub, peer: PeerId) -> Self {
        Self {
            tx_valid: hub.arm(peer, MessageTag::TxValid, None),
            snapshot_confirmed: hub.arm(peer, MessageTag::SnapshotConfirmed, None),
        }
    }
}

/// Give the head time to validate and snapshot a submitted transaction.
///
/// Waits up to `tx_valid_window` for `TxValid`, then up to `timeout` for
/// `SnapshotConfirmed`. A window that elapses just moves on; any other error
/// falls back to a plain sleep of `timeout`. Never fails.
pub async fn wait_for_transaction_processing(
    watch: ConfirmationWatch,
    tx_valid_window: Duration,
    timeout: Duration,
) {
    let ConfirmationWatch {
        tx_valid,
        snapshot_confirmed,
    } = watch;

    let outcome: Result<()> = async {
        match tx_valid.wait(tx_valid_window).await {
            Ok(_) => info!("TxValid received"),
            Err(e) if e.is_timeout() => warn!("No TxValid within window, continuing"),
            Err(e) => return Err(e),
        }
        match snapshot_confirmed.wait(timeout).await {
            Ok(_) => info!("SnapshotConfirmed received"),
            Err(e) if e.is_timeout() => warn!("No SnapshotConfirmed within window, continuing"),
            Err(e) => return Err(e),
        }
        Ok(())
    }
    .await;

    if let Err(e) = outcome {
        warn!(error = %e, "Confirmation wait failed, falling back to fixed delay");
        tokio::time::sleep(timeout).await;
    }
}

/// Alice pays bob from her L2 funds
pub struct PaymentPipeline {
    hub: PeerHub,
    tool: Arc<dyn LedgerTool>,
    node: HydraNodeClient,
    balances: BalanceReader,
    timeouts: TimeoutConfig,
    in_flight: Mutex<()>,
}

impl PaymentPipeline {
    pub fn new(
        hub: PeerHub,
        tool: Arc<dyn LedgerTool>,
        node: HydraNodeClient,
        balances: BalanceReader,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            hub,
            tool,
            node,
            balances,
            timeouts,
            in_flight: Mutex::new(()),
        }
    }

    /// Pay `amount` lovelace to bob and return alice's refreshed L2 balance.
    ///
    /// A second payment while one is running is rejected with `PaymentInProgress`.
    pub async fn execute(&self, amount: u64) -> Result<Balance> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| EscrowError::PaymentInProgress)?;

        info!(amount, "Starting L2 payment");

        let state = self.node.head_status(PeerId::Alice).await?;
        if !state.is_open() {
            return Err(EscrowError::HeadNotOpen {
                state: state.to_string(),
            });
        }

        self.hub.ensure_all_connected().await?;

        let available = self
            .balances
            .try_l2_balance(PeerId::Alice)
            .await
            .map_err(|e| {
                warn!(error = %e, "Could not read alice's L2 balance");
                EscrowError::NoL2Funds
            })?;
        if available.is_zero() {
            return Err(EscrowError::NoL2Funds);
        }
        if amount > available.lovelace {
            return Err(EscrowError::InsufficientFunds {
                requested: amount,
                available: available.lovelace,
            });
        }

        let alice = self.tool.address(PeerId::Alice).await?;
        let bob = self.tool.address(PeerId::Bob).await?;
        let snapshot = self.node.snapshot_utxo(PeerId::Alice).await?;
        let owned = snapshot.owned_by(&alice);
        let (inputs, selected) =
            owned
                .select_covering(amount)
                .ok_or(EscrowError::InsufficientFunds {
                    requested: amount,
                    available: owned.total_lovelace(),
                })?;
        info!(inputs = inputs.len(), selected, amount, "Selected L2 inputs");

        let draft = TxDraft::transfer(inputs, selected, &bob, amount, &alice, L2_FEE).ok_or(
            EscrowError::InsufficientFunds {
                requested: amount,
                available: selected,
            },
        )?;
        let body = self.tool.build_transaction(&draft).await?;
        let signed = self.tool.sign_transaction(PeerId::Alice, &body).await?;

        self.hub.ensure_connected(PeerId::Alice).await?;
        let watch = ConfirmationWatch::arm(&self.hub, PeerId::Alice);
        self.hub.send(
            PeerId::Alice,
            &ClientCommand::NewTx {
                transaction: signed.envelope,
            },
        )?;

        wait_for_transaction_processing(
            watch,
            self.timeouts.tx_valid(),
            self.timeouts.snapshot_confirm(),
        )
        .await;

        let balance = self.balances.l2_balance(PeerId::Alice).await;
        info!(amount, remaining = balance.lovelace, "L2 payment completed");
        Ok(balance)
    }
}
