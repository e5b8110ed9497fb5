use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::adapters::{CardanoCli, HydraNodeClient, LedgerTool, PeerEndpoints, PeerHub};
use crate::api::session::{Clock, SessionStore, SystemClock};
use crate::config::AppConfig;
use crate::error::Result;
use crate::head::{
    BackgroundTasks, BalanceReader, ClosePipeline, CommitPipeline, HeadLifecycle,
    HeadStateTracker, L1Transfer, PaymentPipeline,
};

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// WebSocket links to both peers
    pub hub: PeerHub,

    pub tool: Arc<dyn LedgerTool>,

    /// Cached head state and closing flag
    pub tracker: Arc<HeadStateTracker>,

    pub sessions: Arc<SessionStore>,

    pub balances: BalanceReader,
    pub lifecycle: HeadLifecycle,
    pub close: ClosePipeline,
    pub payments: Arc<PaymentPipeline>,
    pub transfers: L1Transfer,

    /// Detached start/close continuations
    pub tasks: BackgroundTasks,

    /// Claimed by `/start` from before `Init` until the opening task is registered
    pub start_slot: Arc<Mutex<()>>,
}

impl AppState {
    /// State backed by the real `cardano-cli`
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let tool: Arc<dyn LedgerTool> = Arc::new(CardanoCli::new(config.cardano.clone()));
        Self::new(config, tool)
    }

    pub fn new(config: AppConfig, tool: Arc<dyn LedgerTool>) -> Result<Self> {
        Self::with_clock(config, tool, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        tool: Arc<dyn LedgerTool>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let endpoints = PeerEndpoints::from_config(&config.hydra);
        let node = HydraNodeClient::new(endpoints.clone())?;
        let hub = PeerHub::new(endpoints, config.timeouts.connect());

        let balances = BalanceReader::new(tool.clone(), node.clone());
        let commits = CommitPipeline::new(tool.clone(), node.clone());
        let lifecycle = HeadLifecycle::new(
            hub.clone(),
            commits,
            tool.clone(),
            config.timeouts.phase(),
        );
        let close = ClosePipeline::new(hub.clone(), config.timeouts.clone());
        let payments = PaymentPipeline::new(
            hub.clone(),
            tool.clone(),
            node.clone(),
            balances.clone(),
            config.timeouts.clone(),
        );
        let transfers = L1Transfer::new(
            tool.clone(),
            balances.clone(),
            config.cardano.l1_fee_lovelace,
            Duration::from_millis(config.cardano.settle_delay_ms),
        );
        let tracker = HeadStateTracker::new(node, config.hydra.reconcile_peers);
        let sessions = SessionStore::new(chrono::Duration::hours(config.session.ttl_hours), clock);

        Ok(Self {
            config: Arc::new(config),
            hub,
            tool,
            tracker: Arc::new(tracker),
            sessions: Arc::new(sessions),
            balances,
            lifecycle,
            close,
            payments: Arc::new(payments),
            transfers,
            tasks: BackgroundTasks::new(),
            start_slot: Arc::new(Mutex::new(())),
        })
    }

    /// Stop background work and drop both peer links
    pub fn shutdown(&self) {
        self.tasks.abort_all();
        self.hub.disconnect_all();
    }
}
