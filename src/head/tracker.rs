use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::HydraNodeClient;
use crate::domain::{HeadState, PeerId};
use crate::error::Result;

/// Cached projection of the head state, refreshed from alice's `/head`.
///
/// While a close is in flight an `Open` report is shown as `Closing` until the
/// node reports the head finalized.
pub struct HeadStateTracker {
    node: HydraNodeClient,
    reconcile_peers: bool,
    current: RwLock<HeadState>,
    closing_initiated: AtomicBool,
}

impl HeadStateTracker {
    pub fn new(node: HydraNodeClient, reconcile_peers: bool) -> Self {
        Self {
            node,
            reconcile_peers,
            current: RwLock::new(HeadState::Idle),
            closing_initiated: AtomicBool::new(false),
        }
    }

    pub async fn current(&self) -> HeadState {
        self.current.read().await.clone()
    }

    pub fn is_closing(&self) -> bool {
        self.closing_initiated.load(Ordering::SeqCst)
    }

    pub fn set_closing(&self, closing: bool) {
        let previous = self.closing_initiated.swap(closing, Ordering::SeqCst);
        if previous != closing {
            debug!(closing, "Closing flag changed");
        }
    }

    /// Mark a close as in flight and show an open head as `Closing` right away
    pub async fn begin_close(&self) {
        self.set_closing(true);
        let mut current = self.current.write().await;
        *current = current.clone().with_closing_overlay(true);
    }

    /// Store a state learned from a node message, with the closing overlay applied
    pub async fn observe(&self, state: HeadState) {
        let projected = state.with_closing_overlay(self.is_closing());
        let mut current = self.current.write().await;
        if *current != projected {
            info!(from = %*current, to = %projected, "Head state observed");
        }
        *current = projected;
    }

    /// Live status of `peer`'s node without touching the cache
    pub async fn live_status(&self, peer: PeerId) -> Result<HeadState> {
        self.node.head_status(peer).await
    }

    /// Poll alice, apply the closing overlay and store the result.
    ///
    /// A failed poll leaves the cached state unchanged.
    pub async fn refresh(&self) -> HeadState {
        let actual = match self.node.head_status(PeerId::Alice).await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to refresh head state, keeping cached value");
                return self.current().await;
            }
        };

        if self.reconcile_peers {
            self.reconcile(&actual).await;
        }

        if self.is_closing() && actual == HeadState::HeadIsFinalized {
            self.set_closing(false);
            info!("Close completed, head finalized");
        }
        let projected = actual.with_closing_overlay(self.is_closing());

        let mut current = self.current.write().await;
        if *current != projected {
            info!(from = %*current, to = %projected, "Head state updated");
        }
        *current = projected.clone();
        projected
    }

    async fn reconcile(&self, alice: &HeadState) {
        match self.node.head_status(PeerId::Bob).await {
            Ok(bob) if bob != *alice => {
                warn!(alice = %alice, bob = %bob, "Peers disagree on head state, using alice");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Could not poll bob for reconciliation"),
        }
    }
}
